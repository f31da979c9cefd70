//! HTTP routes of the dev server.

use axum::{
    extract::{Request, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::livereload::{client_loop, inject_script, LiveReload, CLIENT_SCRIPT, SCRIPT_PATH, SOCKET_PATH};

#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
    reload: LiveReload,
}

/// Build the router serving `root` with live reload.
pub fn create_router(root: PathBuf, reload: LiveReload) -> Router {
    let state = AppState { root: Arc::new(root), reload };

    Router::new()
        .route(SOCKET_PATH, get(livereload_socket))
        .route(SCRIPT_PATH, get(livereload_script))
        .fallback(serve_output)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn livereload_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let rx = state.reload.subscribe();
    ws.on_upgrade(move |socket| client_loop(socket, rx))
}

async fn livereload_script() -> Response {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], CLIENT_SCRIPT).into_response()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn percent_decode(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex(*bytes.get(i + 1)?)?;
            let lo = hex(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Map a request path onto a path below the output root.
///
/// Returns `None` for anything that would escape the root.
pub fn resolve_request(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode(uri_path)?;
    let mut rel = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let path = root.join(rel);
    if path.is_dir() {
        Some(path.join("index.html"))
    } else {
        Some(path)
    }
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

async fn serve_output(State(state): State<AppState>, req: Request) -> Response {
    let Some(file) = resolve_request(&state.root, req.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if is_html(&file) {
        return match tokio::fs::read_to_string(&file).await {
            Ok(html) => Html(inject_script(&html)).into_response(),
            Err(_) => StatusCode::NOT_FOUND.into_response(),
        };
    }

    match ServeDir::new(state.root.as_path()).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use std::fs;
    use tempfile::TempDir;

    async fn get_path(router: Router, path: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn site() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("blog")).unwrap();
        fs::write(temp.path().join("index.html"), "<html><body><h1>Home</h1></body></html>").unwrap();
        fs::write(temp.path().join("blog/index.html"), "<p>Blog</p>").unwrap();
        fs::write(temp.path().join("app.js"), "console.log(1);").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_html_gets_client_script() {
        let temp = site();
        let router = create_router(temp.path().to_path_buf(), LiveReload::new());
        let (status, body) = get_path(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Home</h1><script src=\"/__livereload.js\"></script></body>"));
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let temp = site();
        let router = create_router(temp.path().to_path_buf(), LiveReload::new());
        let (status, body) = get_path(router, "/blog/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<p>Blog</p><script"));
    }

    #[tokio::test]
    async fn test_other_files_served_verbatim() {
        let temp = site();
        let router = create_router(temp.path().to_path_buf(), LiveReload::new());
        let (status, body) = get_path(router, "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1);");
    }

    #[tokio::test]
    async fn test_client_script_route() {
        let temp = site();
        let router = create_router(temp.path().to_path_buf(), LiveReload::new());
        let (status, body) = get_path(router, "/__livereload.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("location.reload()"));
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let temp = site();
        let router = create_router(temp.path().to_path_buf(), LiveReload::new());
        let (status, _) = get_path(router, "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_resolve_request_rejects_escape() {
        let root = Path::new("/srv/site");
        assert_eq!(resolve_request(root, "/../etc/passwd"), None);
        assert_eq!(resolve_request(root, "/a/%2e%2e/%2e%2e/x"), None);
        assert_eq!(resolve_request(root, "/a%20b.css"), Some(PathBuf::from("/srv/site/a b.css")));
    }
}
