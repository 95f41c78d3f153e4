//! Path routing: `/{role}/{tenant}/...` to a worker pool.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use docfleet_core::{AvailabilityZone, Role, TenantName};

use super::container_id::ContainerIdSource;
use super::controller::{FleetController, FleetError, ServiceHandle};
use super::orchestrator::Orchestrator;
use super::placement::NetworkCatalog;
use crate::registry::WorkerRegistry;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl RouteError {
    fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTarget {
    pub tenant: TenantName,
    pub role: Role,
    /// Worker image serving the role.
    pub image: &'static str,
}

/// Parse `/{role}/{tenant}/...`. The tenant segment is required; anything
/// after it is ignored.
pub fn route(path: &str) -> Result<RouteTarget, RouteError> {
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/');

    let role_segment = segments.next().unwrap_or_default();
    let role: Role = role_segment
        .parse()
        .map_err(|_| RouteError::invalid(path, format!("unknown role prefix {role_segment:?}")))?;

    let tenant_segment = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RouteError::invalid(path, "missing tenant segment"))?;
    let tenant = TenantName::new(tenant_segment).map_err(|e| RouteError::invalid(path, e.to_string()))?;

    Ok(RouteTarget {
        tenant,
        role,
        image: role.image(),
    })
}

/// Something that can place one worker for a routed request.
pub trait WorkerProvisioner: Send + Sync {
    fn provision(
        &self,
        tenant: &TenantName,
        role: Role,
        zone: &AvailabilityZone,
    ) -> Result<ServiceHandle, FleetError>;
}

impl<O, N, R, S> WorkerProvisioner for FleetController<O, N, R, S>
where
    O: Orchestrator,
    N: NetworkCatalog,
    R: WorkerRegistry,
    S: ContainerIdSource,
{
    fn provision(
        &self,
        tenant: &TenantName,
        role: Role,
        zone: &AvailabilityZone,
    ) -> Result<ServiceHandle, FleetError> {
        self.handle_request(tenant, role, zone)
    }
}

impl<P: WorkerProvisioner + ?Sized> WorkerProvisioner for std::sync::Arc<P> {
    fn provision(
        &self,
        tenant: &TenantName,
        role: Role,
        zone: &AvailabilityZone,
    ) -> Result<ServiceHandle, FleetError> {
        (**self).provision(tenant, role, zone)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Fleet(#[from] FleetError),
}

/// Routes paths and hands them to a provisioner in a fixed zone.
pub struct RequestRouter<P> {
    provisioner: P,
    zone: AvailabilityZone,
}

impl<P: WorkerProvisioner> RequestRouter<P> {
    pub fn new(provisioner: P, zone: AvailabilityZone) -> Self {
        Self { provisioner, zone }
    }

    pub fn zone(&self) -> &AvailabilityZone {
        &self.zone
    }

    pub fn route(&self, path: &str) -> Result<RouteTarget, RouteError> {
        route(path)
    }

    /// Route `path` and return the provisioner's result unchanged.
    pub fn dispatch(&self, path: &str) -> Result<ServiceHandle, DispatchError> {
        let target = route(path).inspect_err(|e| warn!(error = %e, "rejected request path"))?;
        info!(tenant = %target.tenant, role = %target.role, image = target.image, "routing request");
        Ok(self
            .provisioner
            .provision(&target.tenant, target.role, &self.zone)?)
    }
}
