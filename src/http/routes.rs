//! Demo routes served by the `graceful-server` binary.

use axum::{http::Uri, routing::get, Json, Router};
use serde_json::{json, Value};

/// Router with `/health`, `/api/v1/users` and a greeting for every other path.
pub fn demo_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/users", get(list_users))
        .fallback(greet)
}

async fn greet(uri: Uri) -> String {
    let name = uri.path().strip_prefix('/').unwrap_or(uri.path());
    format!("Hello, {}!", name)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn list_users() -> Json<Value> {
    Json(json!({ "users": ["alice", "bob"] }))
}
