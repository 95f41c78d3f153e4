use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};
use serde::Serialize;

use docfleet_core::RequestId;
use docfleet_infra::checkpoint::CheckpointStore;

use super::blocking;
use crate::app::errors::store_error_to_response;
use crate::app::services::AppServices;

#[derive(Debug, Serialize)]
pub struct FailedRequests {
    pub requests: Vec<RequestId>,
}

/// Requests whose latest checkpoint is a failure, i.e. the resume worklist.
pub async fn failed(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let listed = match blocking(move || services.checkpoints.list_failed()).await {
        Ok(listed) => listed,
        Err(response) => return response,
    };
    match listed {
        Ok(requests) => Json(FailedRequests { requests }).into_response(),
        Err(e) => store_error_to_response(e),
    }
}
