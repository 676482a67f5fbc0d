//! End-to-end tests for the serve → drain → stop lifecycle.

use std::sync::Arc;
use std::time::Duration;

use graceful_server::{HttpServer, ServerConfig, ServerError, ServerStatus};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

mod common;

use common::{client, slow_router, start_server, SlowHandler};

const EPSILON: Duration = Duration::from_millis(250);

#[tokio::test]
async fn immediate_shutdown_stops_within_grace() {
    let grace = Duration::from_millis(50);
    let running = start_server(ServerConfig::new().with_shutdown_timeout(grace)).await;
    assert_eq!(running.server.status(), ServerStatus::Serving);

    running.server.shutdown();
    let server = running.server.clone();
    running.finish(grace + EPSILON).await.expect("clean shutdown");

    assert_eq!(server.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn repeated_shutdown_is_harmless() {
    let running = start_server(ServerConfig::new().with_shutdown_timeout(Duration::from_millis(50))).await;

    running.server.shutdown();
    running.server.shutdown();
    let handle = running.server.shutdown_handle();
    tokio::spawn(async move { handle.trigger() }).await.unwrap();

    let server = running.server.clone();
    running.finish(Duration::from_secs(1)).await.unwrap();

    server.shutdown();
    assert_eq!(server.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn shutdown_after_signal_is_a_no_op() {
    let server = Arc::new(HttpServer::new(
        ServerConfig::new()
            .with_port("0")
            .with_shutdown_timeout(Duration::from_millis(50)),
    ));
    let (signal_tx, signal_rx) = oneshot::channel::<()>();

    let task = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .listen_and_serve(async {
                    let _ = signal_rx.await;
                })
                .await
        })
    };

    server.serving().await.unwrap();
    signal_tx.send(()).unwrap();
    server.shutdown();
    server.shutdown();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(server.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn port_in_use_is_a_bind_error() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let server = HttpServer::new(ServerConfig::new().with_port(port.to_string()));
    let err = server
        .listen_and_serve(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Bind { .. }), "unexpected error: {err}");
    assert_eq!(server.status(), ServerStatus::Failed);
}

#[tokio::test]
async fn invalid_port_is_a_bind_error() {
    let server = HttpServer::new(ServerConfig::new().with_port("invalid"));
    let err = server
        .listen_and_serve(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Bind { .. }));
    assert_eq!(server.status(), ServerStatus::Failed);
}

#[tokio::test]
async fn serves_requests_until_shutdown() {
    let slow = SlowHandler::default();
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::from_millis(10), slow))
            .with_shutdown_timeout(Duration::from_millis(200)),
    )
    .await;

    let body = client()
        .get(running.url("/fast"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "fast");

    running.server.shutdown();
    running.finish(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn idle_keep_alive_connection_does_not_block_drain() {
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::ZERO, SlowHandler::default()))
            .with_shutdown_timeout(Duration::from_secs(2)),
    )
    .await;

    // The pooled connection stays open after the response.
    let client = client();
    let response = client.get(running.url("/fast")).send().await.unwrap();
    assert!(response.status().is_success());

    running.server.shutdown();
    running
        .finish(Duration::from_millis(500))
        .await
        .expect("idle connections should be closed right away");
}

#[tokio::test]
async fn in_flight_request_finishes_within_grace() {
    let slow = SlowHandler::default();
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::from_millis(100), slow.clone()))
            .with_shutdown_timeout(Duration::from_secs(2)),
    )
    .await;

    let request = tokio::spawn(client().get(running.url("/slow")).send());
    slow.started.notified().await;

    running.server.shutdown();
    let server = running.server.clone();
    running.finish(Duration::from_secs(2) + EPSILON).await.unwrap();

    let response = request.await.unwrap().unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "done");
    assert!(slow.finished());
    assert!(!slow.cancelled());
    assert_eq!(server.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn request_exceeding_grace_is_cancelled() {
    let grace = Duration::from_millis(10);
    let slow = SlowHandler::default();
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::from_millis(100), slow.clone()))
            .with_shutdown_timeout(grace),
    )
    .await;

    let request = tokio::spawn(client().get(running.url("/slow")).send());
    slow.started.notified().await;

    running.server.shutdown();
    let server = running.server.clone();
    let err = running.finish(Duration::from_secs(1)).await.unwrap_err();

    assert!(
        matches!(err, ServerError::ShutdownTimeout { grace: g } if g == grace),
        "unexpected error: {err}"
    );
    assert!(slow.cancelled());
    assert!(!slow.finished());
    assert_eq!(server.status(), ServerStatus::Failed);
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn listener_closes_as_soon_as_drain_starts() {
    let slow = SlowHandler::default();
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::from_millis(500), slow.clone()))
            .with_shutdown_timeout(Duration::from_secs(2)),
    )
    .await;

    let request = tokio::spawn(client().get(running.url("/slow")).send());
    slow.started.notified().await;
    running.server.shutdown();

    let mut refused = false;
    for _ in 0..50 {
        if TcpStream::connect(running.addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(refused, "listener still accepting while draining");
    assert!(!slow.finished(), "drain should still be waiting on the slow request");
    assert_eq!(running.server.status(), ServerStatus::Draining);

    running.finish(Duration::from_secs(3)).await.unwrap();
    assert!(request.await.unwrap().unwrap().status().is_success());
}

#[tokio::test]
async fn io_timeout_bounds_each_request() {
    let running = start_server(
        ServerConfig::new()
            .with_router(slow_router(Duration::from_millis(500), SlowHandler::default()))
            .with_io_timeout(Duration::from_millis(50))
            .with_shutdown_timeout(Duration::from_secs(1)),
    )
    .await;

    let response = client().get(running.url("/slow")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::REQUEST_TIMEOUT);

    running.server.shutdown();
    running.finish(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn server_runs_only_once() {
    let running = start_server(ServerConfig::new().with_shutdown_timeout(Duration::from_millis(50))).await;
    let err = running
        .server
        .listen_and_serve(std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStarted));
    assert_eq!(running.server.status(), ServerStatus::Serving);

    running.server.shutdown();
    running.finish(Duration::from_secs(1)).await.unwrap();
}
