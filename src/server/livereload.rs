//! Live-reload channel and client script.

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::watch::ReloadNotifier;

/// Path of the WebSocket endpoint.
pub const SOCKET_PATH: &str = "/__livereload";
/// Path of the client script.
pub const SCRIPT_PATH: &str = "/__livereload.js";
/// Tag injected into every served HTML page.
pub const SCRIPT_TAG: &str = "<script src=\"/__livereload.js\"></script>";

/// Client script: reload on `reload`, reconnect when the socket drops.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  var url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '/__livereload';
  function connect() {
    var socket = new WebSocket(url);
    socket.onmessage = function (event) {
      if (event.data === 'reload') {
        location.reload();
      }
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }
  connect();
})();
"#;

/// Broadcast handle shared by the watchers and every connected client.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<()>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Receiver for one client connection.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Number of connected clients.
    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ReloadNotifier for LiveReload {
    fn reload(&self) {
        // Sending fails only when nobody is connected.
        let clients = self.tx.send(()).unwrap_or(0);
        tracing::info!(clients, "Reload");
    }
}

/// Forward reload notifications to one client until either side closes.
pub async fn client_loop(mut socket: WebSocket, mut rx: broadcast::Receiver<()>) {
    tracing::debug!("Live-reload client connected");
    loop {
        tokio::select! {
            notification = rx.recv() => match notification {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    if socket.send(Message::Text("reload".into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Live-reload client disconnected");
}

/// Insert the client script tag before the last `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], SCRIPT_TAG, &html[at..]),
        None => format!("{}{}", html, SCRIPT_TAG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_closing_body() {
        let html = "<html><body><p>x</p></BODY></html>";
        assert_eq!(
            inject_script(html),
            "<html><body><p>x</p><script src=\"/__livereload.js\"></script></BODY></html>"
        );
    }

    #[test]
    fn test_inject_appends_without_body() {
        assert_eq!(inject_script("<p>x</p>"), format!("<p>x</p>{}", SCRIPT_TAG));
    }

    #[test]
    fn test_reload_reaches_subscribers() {
        let reload = LiveReload::new();
        let mut rx = reload.subscribe();
        assert_eq!(reload.clients(), 1);
        reload.reload();
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[test]
    fn test_reload_without_clients_is_harmless() {
        LiveReload::new().reload();
    }
}
