//! Dev server session.
//!
//! A [`ServerSession`] owns a tokio runtime, the HTTP server serving the
//! output tree and one watch subscription per asset category. It is an
//! explicit value: `start` brings everything up, `wait` blocks until Ctrl-C,
//! and `shutdown` tears it down.
//!
//! ```ignore
//! let session = ServerSession::start(Arc::new(context))?;
//! println!("Serving at http://{}", session.addr());
//! session.wait()?;
//! ```

pub mod livereload;
pub mod routes;

pub use livereload::{inject_script, LiveReload};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::build::BuildContext;
use crate::watch::{self, ReloadNotifier, TaskRunner, WatchError, WatchSubscription};

/// Error type for the dev server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    /// The tokio runtime could not be created
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The listen address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Watches could not be registered
    #[error(transparent)]
    Watch(#[from] WatchError),
    /// The server stopped with an error
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
    /// The server task panicked or was cancelled
    #[error("Server task failed: {0}")]
    Join(String),
}

/// A running dev server with its watches.
pub struct ServerSession {
    runtime: Runtime,
    addr: SocketAddr,
    reload: LiveReload,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
    subscriptions: Vec<WatchSubscription>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("addr", &self.addr)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl ServerSession {
    /// Bind the server and register the watches.
    ///
    /// The listen address comes from `[serve]`; port 0 picks a free port.
    pub fn start(context: Arc<BuildContext>) -> Result<Self, ServeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(ServeError::Runtime)?;

        let serve = &context.config().serve;
        let addr = format!("{}:{}", serve.host, serve.port);
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(&addr))
            .map_err(|source| ServeError::Bind { addr: addr.clone(), source })?;
        let addr = listener.local_addr().map_err(|source| ServeError::Bind { addr, source })?;

        let out = context.out_dir();
        let reload = LiveReload::new();
        let router = create_router(out.clone(), reload.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = runtime.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let runner: Arc<dyn TaskRunner> = context.clone();
        let notifier: Arc<dyn ReloadNotifier> = Arc::new(reload.clone());
        let subscriptions = watch::subscribe_all(&context, runner, notifier)?;
        if watch::is_watched(&subscriptions, &out) {
            tracing::warn!(out = %out.display(), "Output directory is inside a watched directory");
        }

        tracing::info!(out = %out.display(), "Serving at http://{}", addr);
        Ok(Self { runtime, addr, reload, shutdown_tx, server, subscriptions })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for sending reload notifications to connected clients.
    pub fn reload_handle(&self) -> LiveReload {
        self.reload.clone()
    }

    /// Active watch subscriptions.
    pub fn subscriptions(&self) -> &[WatchSubscription] {
        &self.subscriptions
    }

    /// Block until Ctrl-C, then shut down.
    pub fn wait(self) -> Result<(), ServeError> {
        if let Err(e) = self.runtime.block_on(tokio::signal::ctrl_c()) {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Shutting down");
        self.shutdown()
    }

    /// Stop watching, stop the server and wait for it to finish.
    pub fn shutdown(self) -> Result<(), ServeError> {
        let ServerSession { runtime, shutdown_tx, server, subscriptions, .. } = self;
        drop(subscriptions);
        let _ = shutdown_tx.send(());

        let result = runtime.block_on(server);
        // Live-reload sockets outlive graceful shutdown; stop them here.
        runtime.shutdown_timeout(Duration::from_millis(500));

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServeError::Server(e)),
            Err(e) => Err(ServeError::Join(e.to_string())),
        }
    }
}
