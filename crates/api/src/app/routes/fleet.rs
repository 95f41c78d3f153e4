use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use docfleet_core::{Role, ServiceKey};
use docfleet_infra::heartbeat::classify;
use docfleet_infra::registry::WorkerRegistry;

use super::blocking;
use crate::app::errors::{fleet_error_to_response, json_error, store_error_to_response};
use crate::app::services::AppServices;

/// Heartbeat liveness of every known worker.
pub async fn workers(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let interval = services.heartbeat.interval;
    let listed = match blocking(move || services.registry.list_heartbeats()).await {
        Ok(listed) => listed,
        Err(response) => return response,
    };
    match listed {
        Ok(heartbeats) => Json(classify(&heartbeats, Utc::now(), interval)).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

/// Desired count of the role's service in this zone against live workers.
pub async fn capacity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(role): Path<String>,
) -> axum::response::Response {
    let role: Role = match role.parse() {
        Ok(role) => role,
        Err(_) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_role",
                format!("unknown role {role:?}"),
                "use admin or user",
            );
        }
    };

    let report = blocking(move || {
        let key = ServiceKey::new(role, services.router.zone().clone());
        services.fleet.reconcile(&key, Utc::now())
    })
    .await;
    match report {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => fleet_error_to_response(e),
        Err(response) => response,
    }
}
