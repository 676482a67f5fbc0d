//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use graceful_server::{HttpServer, ServerConfig, ServerError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A server running in a background task with no shutdown signal attached.
pub struct RunningServer {
    pub server: Arc<HttpServer>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for `listen_and_serve` to return, failing the test after `limit`.
    pub async fn finish(self, limit: Duration) -> Result<(), ServerError> {
        tokio::time::timeout(limit, self.task)
            .await
            .expect("listen_and_serve did not return in time")
            .expect("server task panicked")
    }
}

/// Start `config` on an OS-chosen port and wait until it is serving.
pub async fn start_server(config: ServerConfig) -> RunningServer {
    let server = Arc::new(HttpServer::new(config.with_port("0")));
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.listen_and_serve(std::future::pending()).await })
    };

    let bound = server.serving().await.expect("server should bind port 0");
    RunningServer {
        server,
        addr: SocketAddr::from(([127, 0, 0, 1], bound.port())),
        task,
    }
}

/// Observes what happened to a slow handler.
#[derive(Clone, Default)]
pub struct SlowHandler {
    pub started: Arc<Notify>,
    pub finished: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
}

impl SlowHandler {
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Marks the handler cancelled if the handler future is dropped before finishing.
struct CancelGuard {
    slow: SlowHandler,
    done: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.done {
            self.slow.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

/// Router whose `/slow` handler sleeps for `delay` before responding.
pub fn slow_router(delay: Duration, slow: SlowHandler) -> Router {
    Router::new()
        .route(
            "/slow",
            get(move || {
                let slow = slow.clone();
                async move {
                    let mut guard = CancelGuard {
                        slow: slow.clone(),
                        done: false,
                    };
                    slow.started.notify_one();
                    tokio::time::sleep(delay).await;
                    guard.done = true;
                    slow.finished.store(true, Ordering::SeqCst);
                    "done"
                }
            }),
        )
        .route("/fast", get(|| async { "fast" }))
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
