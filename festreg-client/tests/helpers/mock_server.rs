//! Local axum server standing in for the backend

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral port; returns its base URL
pub async fn spawn_server(router: Router) -> String {
    spawn_server_with(|_| router).await
}

/// Serve a router that needs its own base URL (e.g. to hand out upload
/// destinations pointing back at itself)
pub async fn spawn_server_with<F>(build: F) -> String
where
    F: FnOnce(String) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// Base URL of a port nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
