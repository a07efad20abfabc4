//! Ava daemon library.
//!
//! Exposes the admin router, shared state and error mapping so the binary
//! and the integration tests build the same application.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// The complete admin application: `/health` plus the `/admin` routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/admin", routes::admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
