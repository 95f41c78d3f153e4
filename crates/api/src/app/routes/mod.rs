use axum::{Router, routing::get};
use axum::http::StatusCode;

use super::errors::json_error;

pub mod dispatch;
pub mod fleet;
pub mod requests;
pub mod system;

/// Named endpoints. Role-prefixed paths go to the fallback in `build_app`.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/requests/failed", get(requests::failed))
        .route("/workers", get(fleet::workers))
        .route("/services/:role", get(fleet::capacity))
}

/// Run a store or fleet call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, axum::response::Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "blocking task failed");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "request handler failed",
            "retry the request",
        )
    })
}
