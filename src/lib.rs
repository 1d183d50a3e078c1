pub mod chat;
pub mod config;
pub mod discord;
pub mod error;
pub mod lang;
pub mod llm;
pub mod settings;

use axum::{routing::get, Json, Router};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatrelay",
        "version": VERSION
    }))
}

pub async fn root() -> &'static str {
    "⚡ chatrelay - Discord → PLLuM"
}

/// Small status app so hosting platforms have something to probe.
pub fn status_app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}
