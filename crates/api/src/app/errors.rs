use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use docfleet_infra::StoreError;
use docfleet_infra::fleet::{DispatchError, FleetError, OrchestratorError};

pub const ROUTE_HINT: &str = "use /admin/{tenant}/... or /user/{tenant}/...";

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Route(e) => json_error(StatusCode::BAD_REQUEST, "invalid_path", e.to_string(), ROUTE_HINT),
        DispatchError::Fleet(e) => fleet_error_to_response(e),
    }
}

pub fn fleet_error_to_response(err: FleetError) -> axum::response::Response {
    let status = match &err {
        FleetError::AtCapacity { .. } => StatusCode::CONFLICT,
        FleetError::Substrate(OrchestratorError::NotFound(_)) => {
            return json_error(
                StatusCode::NOT_FOUND,
                "service_not_found",
                err.to_string(),
                "route a request to the role first",
            );
        }
        FleetError::Substrate(_) | FleetError::ServiceVanished(_) | FleetError::Launch { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.code(), err.to_string(), err.next_step())
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "store call failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_error",
        err.to_string(),
        "retry the request",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    next_step: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "next_step": next_step.into(),
        })),
    )
        .into_response()
}
