//! Fleet controller: create-or-scale a worker service per `(role, zone)` and
//! launch one identified worker per request.
//!
//! Updates to one service key are serialised by an in-process lock, and the
//! desired-count change itself is a compare-and-swap against the substrate.
//! Controllers in different processes therefore still converge: a lost
//! `create_service` race turns into a scale-out and a stale count is re-read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use docfleet_core::{
    AvailabilityZone, ContainerId, Placement, Role, ScalingPolicy, ServiceDescriptor, ServiceKey,
    TenantName, WorkerInfo,
};

use super::container_id::{ContainerIdError, ContainerIdGenerator, ContainerIdSource, RandomIds};
use super::orchestrator::{Orchestrator, OrchestratorError, ServiceSpec};
use super::placement::{NetworkCatalog, resolve_placement, target_group_name};
use crate::config::{FleetConfig, WorkerIdentity};
use crate::heartbeat::classify;
use crate::registry::WorkerRegistry;
use crate::store::StoreError;

/// Compare-and-swap attempts before giving up on a contended key.
const MAX_SCALE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FleetError {
    #[error("no private subnet tagged for zone {zone}")]
    NoPlacement { zone: AvailabilityZone },

    #[error("target group {0} does not exist")]
    MissingTargetGroup(String),

    #[error("{service} is already at max capacity {max_capacity}")]
    AtCapacity { service: String, max_capacity: u32 },

    #[error("{service}: desired count kept changing after {attempts} attempts")]
    Contended { service: String, attempts: usize },

    #[error("service {0} disappeared while scaling")]
    ServiceVanished(String),

    #[error(transparent)]
    Substrate(#[from] OrchestratorError),

    #[error("worker registry: {0}")]
    Registry(#[from] StoreError),

    #[error(transparent)]
    ContainerId(#[from] ContainerIdError),

    /// The service exists with its new desired count but the worker did not
    /// start. Nothing is rolled back.
    #[error("{service}: launching worker {container_id} failed: {message}")]
    Launch {
        service: String,
        container_id: ContainerId,
        message: String,
    },
}

impl FleetError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPlacement { .. } | Self::MissingTargetGroup(_) => "placement_unavailable",
            Self::AtCapacity { .. } => "at_capacity",
            Self::Contended { .. } => "contended",
            Self::ServiceVanished(_) | Self::Substrate(_) => "substrate_error",
            Self::Registry(_) => "registry_error",
            Self::ContainerId(_) => "container_id_exhausted",
            Self::Launch { .. } => "launch_failed",
        }
    }

    /// Actionable hint for the caller.
    pub fn next_step(&self) -> String {
        match self {
            Self::NoPlacement { zone } => {
                format!("tag a private subnet in {zone} or route the request to another zone")
            }
            Self::MissingTargetGroup(name) => format!("create target group {name}"),
            Self::AtCapacity { service, .. } => {
                format!("wait for {service} to free capacity or raise its max_capacity")
            }
            Self::Launch { service, .. } => {
                format!("retry the request; {service} keeps its desired count until reconciled")
            }
            _ => "retry the request".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Created,
    ScaledOut,
}

/// What a successful request did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHandle {
    pub service_name: String,
    pub key: ServiceKey,
    pub action: ServiceAction,
    pub desired_count: u32,
    pub container_id: ContainerId,
    pub placement: Placement,
}

/// Desired capacity of a service against what its heartbeats show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityReport {
    pub service_name: String,
    pub desired_count: u32,
    pub live: Vec<ContainerId>,
    pub stale: Vec<ContainerId>,
    /// Registered workers that never sent a heartbeat.
    pub silent: Vec<ContainerId>,
    pub deficit: u32,
}

pub struct FleetController<O, N, R, S = RandomIds> {
    orchestrator: O,
    catalog: N,
    registry: R,
    ids: ContainerIdGenerator<S>,
    config: FleetConfig,
    policy: ScalingPolicy,
    heartbeat_interval: Duration,
    key_locks: Mutex<HashMap<ServiceKey, Arc<Mutex<()>>>>,
}

impl<O, N, R> FleetController<O, N, R, RandomIds>
where
    O: Orchestrator,
    N: NetworkCatalog,
    R: WorkerRegistry,
{
    pub fn new(orchestrator: O, catalog: N, registry: R, config: FleetConfig) -> Self {
        let ids = ContainerIdGenerator::random(config.id_attempt_limit);
        Self::with_id_generator(orchestrator, catalog, registry, config, ids)
    }
}

impl<O, N, R, S> FleetController<O, N, R, S>
where
    O: Orchestrator,
    N: NetworkCatalog,
    R: WorkerRegistry,
    S: ContainerIdSource,
{
    pub fn with_id_generator(
        orchestrator: O,
        catalog: N,
        registry: R,
        config: FleetConfig,
        ids: ContainerIdGenerator<S>,
    ) -> Self {
        Self {
            orchestrator,
            catalog,
            registry,
            ids,
            config,
            policy: ScalingPolicy::default(),
            heartbeat_interval: Duration::from_secs(60),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_scaling_policy(mut self, policy: ScalingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn key_lock(&self, key: &ServiceKey) -> Result<Arc<Mutex<()>>, FleetError> {
        let mut locks = self.key_locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Create or scale the service for `(role, zone)` and launch one worker
    /// for `tenant` on it.
    #[instrument(skip_all, fields(tenant = %tenant, role = %role, zone = %zone))]
    pub fn handle_request(
        &self,
        tenant: &TenantName,
        role: Role,
        zone: &AvailabilityZone,
    ) -> Result<ServiceHandle, FleetError> {
        let result = self.provision_worker(tenant, role, zone);
        match &result {
            Ok(handle) => info!(
                service = %handle.service_name,
                action = ?handle.action,
                desired_count = handle.desired_count,
                container_id = %handle.container_id,
                "worker provisioned"
            ),
            Err(e) => error!(error = %e, code = e.code(), "provisioning failed"),
        }
        result
    }

    fn provision_worker(
        &self,
        tenant: &TenantName,
        role: Role,
        zone: &AvailabilityZone,
    ) -> Result<ServiceHandle, FleetError> {
        let placement = resolve_placement(&self.catalog.subnets()?, zone, &self.config)
            .ok_or_else(|| FleetError::NoPlacement { zone: zone.clone() })?;
        let key = ServiceKey::new(role, zone.clone());

        let (descriptor, action) = {
            let lock = self.key_lock(&key)?;
            let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;
            match self.orchestrator.describe_service(&key)? {
                Some(_) => (self.scale_out(&key)?, ServiceAction::ScaledOut),
                None => match self.create(&key, tenant, placement.clone()) {
                    Ok(descriptor) => (descriptor, ServiceAction::Created),
                    Err(FleetError::Substrate(OrchestratorError::AlreadyExists(name))) => {
                        info!(service = %name, "service created concurrently; scaling instead");
                        (self.scale_out(&key)?, ServiceAction::ScaledOut)
                    }
                    Err(e) => return Err(e),
                },
            }
        };

        let container_id = self.ids.generate(&self.registry)?;
        // Reserve the id; the worker rewrites this row when it starts.
        self.registry.put_worker_info(&WorkerInfo {
            container_id: container_id.clone(),
            tenant: tenant.clone(),
            role,
            zone: zone.clone(),
            registered_at: Utc::now(),
        })?;

        let identity = WorkerIdentity {
            tenant: tenant.clone(),
            role,
            container_id: container_id.clone(),
            zone: zone.clone(),
        };
        if let Err(e) = self.orchestrator.launch_worker(&key, &identity) {
            warn!(
                service = %descriptor.name,
                container_id = %container_id,
                error = %e,
                "service provisioned but worker launch failed; leaving it for reconciliation"
            );
            return Err(FleetError::Launch {
                service: descriptor.name,
                container_id,
                message: e.to_string(),
            });
        }

        Ok(ServiceHandle {
            service_name: descriptor.name,
            key,
            action,
            desired_count: descriptor.desired_count,
            container_id,
            placement: descriptor.placement,
        })
    }

    fn create(
        &self,
        key: &ServiceKey,
        tenant: &TenantName,
        placement: Placement,
    ) -> Result<ServiceDescriptor, FleetError> {
        let group_name = target_group_name(key.role);
        let target_group = self
            .catalog
            .target_group(&group_name)?
            .ok_or(FleetError::MissingTargetGroup(group_name))?;

        let mut tags = self.config.required_tags.clone();
        tags.insert("Name".to_string(), format!("ecs-{tenant}"));

        let spec = ServiceSpec {
            key: key.clone(),
            name: key.service_name(),
            image: key.role.image().to_string(),
            desired_count: self.policy.min_capacity.max(1),
            placement,
            target_group,
            container_port: self.config.container_port,
            tags,
            scaling_policy: self.policy.clone(),
        };
        let descriptor = self.orchestrator.create_service(&spec)?;
        self.orchestrator.register_scalable_target(
            key,
            self.policy.min_capacity,
            self.policy.max_capacity,
        )?;
        self.orchestrator.put_scaling_policy(key, &self.policy)?;
        info!(service = %descriptor.name, target_group = %spec.target_group, "service created");
        Ok(descriptor)
    }

    fn scale_out(&self, key: &ServiceKey) -> Result<ServiceDescriptor, FleetError> {
        for _ in 0..MAX_SCALE_ATTEMPTS {
            let current = self
                .orchestrator
                .describe_service(key)?
                .ok_or_else(|| FleetError::ServiceVanished(key.service_name()))?;
            let next = current.scaled_out().map_err(|_| FleetError::AtCapacity {
                service: current.name.clone(),
                max_capacity: current.scaling_policy.max_capacity,
            })?;
            match self
                .orchestrator
                .update_desired_count(key, current.desired_count, next)
            {
                Ok(updated) => return Ok(updated),
                Err(OrchestratorError::Conflict { expected, actual, .. }) => {
                    warn!(service = %current.name, expected, actual, "desired count moved; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FleetError::Contended {
            service: key.service_name(),
            attempts: MAX_SCALE_ATTEMPTS,
        })
    }

    /// Compare the service's desired count with its workers' heartbeats as of
    /// `now`. Reports only; nothing is started or stopped.
    pub fn reconcile(&self, key: &ServiceKey, now: DateTime<Utc>) -> Result<CapacityReport, FleetError> {
        let descriptor = self
            .orchestrator
            .describe_service(key)?
            .ok_or_else(|| FleetError::Substrate(OrchestratorError::NotFound(key.service_name())))?;

        let workers: Vec<ContainerId> = self
            .registry
            .list_worker_info()?
            .into_iter()
            .filter(|w| w.role == key.role && w.zone == key.zone)
            .map(|w| w.container_id)
            .collect();

        let mut heartbeats = Vec::new();
        let mut silent = Vec::new();
        for id in workers {
            match self.registry.get_heartbeat(&id)? {
                Some(hb) => heartbeats.push(hb),
                None => silent.push(id),
            }
        }
        let liveness = classify(&heartbeats, now, self.heartbeat_interval);
        let live = u32::try_from(liveness.live.len()).unwrap_or(u32::MAX);
        let deficit = descriptor.desired_count.saturating_sub(live);

        if deficit > 0 {
            warn!(
                service = %descriptor.name,
                desired_count = descriptor.desired_count,
                live,
                stale = liveness.dead.len(),
                silent = silent.len(),
                "service below desired capacity"
            );
        }

        Ok(CapacityReport {
            service_name: descriptor.name,
            desired_count: descriptor.desired_count,
            live: liveness.live,
            stale: liveness.dead,
            silent,
            deficit,
        })
    }
}
