//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store and fleet wiring
//! - `routes/`: handlers; role-prefixed paths are served by the fallback
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: services::AppServices) -> Router {
    let services = Arc::new(services);

    routes::router()
        .fallback(routes::dispatch::dispatch)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
