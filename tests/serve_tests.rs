//! Dev server tests over a real socket.

use sitepipe::build::BuildContext;
use sitepipe::config::SiteConfig;
use sitepipe::resources::Category;
use sitepipe::server::ServerSession;
use sitepipe::watch::ReloadNotifier;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tempfile::TempDir;

fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", path, addr).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn session(temp: &TempDir) -> ServerSession {
    let mut config = SiteConfig::default();
    config.serve.port = 0;
    let ctx = BuildContext::new(config, temp.path()).unwrap();
    ServerSession::start(Arc::new(ctx)).unwrap()
}

#[test]
fn test_serves_output_with_injected_client() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("dist/styles")).unwrap();
    fs::write(temp.path().join("dist/index.html"), "<html><body><p>Hi</p></body></html>").unwrap();
    fs::write(temp.path().join("dist/styles/styles.css"), ".a{color:red}").unwrap();

    let session = session(&temp);
    let addr = session.addr();
    assert_ne!(addr.port(), 0);

    let page = get(addr, "/");
    assert!(page.starts_with("HTTP/1.1 200"));
    assert!(page.contains("<p>Hi</p><script src=\"/__livereload.js\"></script></body>"));

    let css = get(addr, "/styles/styles.css");
    assert!(css.starts_with("HTTP/1.1 200"));
    assert!(css.ends_with(".a{color:red}"));

    let script = get(addr, "/__livereload.js");
    assert!(script.contains("/__livereload"));

    assert!(get(addr, "/missing.html").starts_with("HTTP/1.1 404"));

    session.shutdown().unwrap();
}

#[test]
fn test_reload_handle_and_subscriptions() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src/html")).unwrap();
    fs::create_dir_all(temp.path().join("src/styles")).unwrap();

    let session = session(&temp);
    let reload = session.reload_handle();
    let mut rx = reload.subscribe();
    reload.reload();
    assert!(rx.try_recv().is_ok());

    let subscriptions = session.subscriptions();
    assert_eq!(subscriptions.len(), 7);
    let dirs_of = |category: Category| {
        subscriptions.iter().find(|s| s.category() == category).map(|s| s.dirs().to_vec()).unwrap()
    };
    let root = temp.path().canonicalize().unwrap();
    assert_eq!(dirs_of(Category::Markup), vec![root.join("src/html")]);
    assert_eq!(dirs_of(Category::Styles), vec![root.join("src/styles")]);
    // Missing category directories fall back to the source root.
    assert_eq!(dirs_of(Category::Images), vec![root.join("src")]);

    session.shutdown().unwrap();
}
