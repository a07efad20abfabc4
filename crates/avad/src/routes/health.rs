use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Liveness response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: ava_core::VERSION,
    })
}

/// Mounted at the root, outside `/admin`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
