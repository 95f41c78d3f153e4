use std::sync::Arc;

use axum::{Json, extract::Extension, http::Uri, response::IntoResponse};

use super::blocking;
use crate::app::errors::dispatch_error_to_response;
use crate::app::services::AppServices;

/// Fallback for `/{role}/{tenant}/...`: place a worker for the tenant and
/// describe what was done.
pub async fn dispatch(Extension(services): Extension<Arc<AppServices>>, uri: Uri) -> axum::response::Response {
    let path = uri.path().to_string();
    match blocking(move || services.router.dispatch(&path)).await {
        Ok(Ok(handle)) => Json(handle).into_response(),
        Ok(Err(e)) => dispatch_error_to_response(e),
        Err(response) => response,
    }
}
