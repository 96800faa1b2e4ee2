use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness probe. The service holds no local durable state, so being able
/// to answer is the whole check; collaborator reachability is reported per
/// request instead.
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
