//! Container orchestration substrate.
//!
//! `update_desired_count` is a compare-and-swap: it only applies when the
//! service still has the expected count, which is what makes concurrent
//! scale-outs safe without a distributed lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use docfleet_core::{Placement, ScalingPolicy, ServiceDescriptor, ServiceKey};

use crate::config::WorkerIdentity;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("service {0} already exists")]
    AlreadyExists(String),

    #[error("service {0} not found")]
    NotFound(String),

    #[error("desired count of {service} changed concurrently (expected {expected}, found {actual})")]
    Conflict {
        service: String,
        expected: u32,
        actual: u32,
    },

    #[error("orchestration substrate error: {0}")]
    Substrate(String),
}

/// Everything needed to create a worker service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    pub key: ServiceKey,
    pub name: String,
    pub image: String,
    pub desired_count: u32,
    pub placement: Placement,
    pub target_group: String,
    pub container_port: u16,
    pub tags: BTreeMap<String, String>,
    pub scaling_policy: ScalingPolicy,
}

impl ServiceSpec {
    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            key: self.key.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            desired_count: self.desired_count,
            placement: self.placement.clone(),
            scaling_policy: self.scaling_policy.clone(),
        }
    }
}

pub trait Orchestrator: Send + Sync {
    fn describe_service(&self, key: &ServiceKey) -> Result<Option<ServiceDescriptor>, OrchestratorError>;

    fn list_services(&self) -> Result<Vec<ServiceDescriptor>, OrchestratorError>;

    /// Fails with `AlreadyExists` when a service for `spec.key` exists.
    fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceDescriptor, OrchestratorError>;

    /// Set desired count to `desired` iff it currently equals `expected`.
    fn update_desired_count(
        &self,
        key: &ServiceKey,
        expected: u32,
        desired: u32,
    ) -> Result<ServiceDescriptor, OrchestratorError>;

    fn register_scalable_target(
        &self,
        key: &ServiceKey,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Result<(), OrchestratorError>;

    /// Install a target-tracking policy on the utilisation signal.
    fn put_scaling_policy(&self, key: &ServiceKey, policy: &ScalingPolicy) -> Result<(), OrchestratorError>;

    /// Start one worker of the service with `identity` in its environment.
    fn launch_worker(&self, key: &ServiceKey, identity: &WorkerIdentity) -> Result<(), OrchestratorError>;
}

impl<O: Orchestrator + ?Sized> Orchestrator for Arc<O> {
    fn describe_service(&self, key: &ServiceKey) -> Result<Option<ServiceDescriptor>, OrchestratorError> {
        (**self).describe_service(key)
    }

    fn list_services(&self) -> Result<Vec<ServiceDescriptor>, OrchestratorError> {
        (**self).list_services()
    }

    fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceDescriptor, OrchestratorError> {
        (**self).create_service(spec)
    }

    fn update_desired_count(
        &self,
        key: &ServiceKey,
        expected: u32,
        desired: u32,
    ) -> Result<ServiceDescriptor, OrchestratorError> {
        (**self).update_desired_count(key, expected, desired)
    }

    fn register_scalable_target(
        &self,
        key: &ServiceKey,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Result<(), OrchestratorError> {
        (**self).register_scalable_target(key, min_capacity, max_capacity)
    }

    fn put_scaling_policy(&self, key: &ServiceKey, policy: &ScalingPolicy) -> Result<(), OrchestratorError> {
        (**self).put_scaling_policy(key, policy)
    }

    fn launch_worker(&self, key: &ServiceKey, identity: &WorkerIdentity) -> Result<(), OrchestratorError> {
        (**self).launch_worker(key, identity)
    }
}

/// Full state of one service in the in-memory substrate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub spec: ServiceSpec,
    pub descriptor: ServiceDescriptor,
    pub scalable_target: Option<(u32, u32)>,
    pub policy: Option<ScalingPolicy>,
    pub launched: Vec<WorkerIdentity>,
}

/// In-memory orchestration substrate for tests/dev.
///
/// Fault injection: `fail_next_launches(n)` and `fail_next_creates(n)` make the
/// next `n` calls fail with `OrchestratorError::Substrate`.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    services: Mutex<BTreeMap<ServiceKey, ServiceRecord>>,
    failing_launches: AtomicUsize,
    failing_creates: AtomicUsize,
    create_calls: AtomicUsize,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn poisoned() -> OrchestratorError {
    OrchestratorError::Substrate("orchestrator state lock poisoned".into())
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_launches(&self, n: usize) {
        self.failing_launches.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Number of `create_service` calls, successful or not.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self, key: &ServiceKey) -> Option<ServiceRecord> {
        self.services.lock().ok()?.get(key).cloned()
    }
}

impl Orchestrator for InMemoryOrchestrator {
    fn describe_service(&self, key: &ServiceKey) -> Result<Option<ServiceDescriptor>, OrchestratorError> {
        let guard = self.services.lock().map_err(|_| poisoned())?;
        Ok(guard.get(key).map(|r| r.descriptor.clone()))
    }

    fn list_services(&self) -> Result<Vec<ServiceDescriptor>, OrchestratorError> {
        let guard = self.services.lock().map_err(|_| poisoned())?;
        Ok(guard.values().map(|r| r.descriptor.clone()).collect())
    }

    fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceDescriptor, OrchestratorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_creates) {
            return Err(OrchestratorError::Substrate("injected create failure".into()));
        }
        let mut guard = self.services.lock().map_err(|_| poisoned())?;
        if guard.contains_key(&spec.key) {
            return Err(OrchestratorError::AlreadyExists(spec.name.clone()));
        }
        let descriptor = spec.descriptor();
        guard.insert(
            spec.key.clone(),
            ServiceRecord {
                spec: spec.clone(),
                descriptor: descriptor.clone(),
                scalable_target: None,
                policy: None,
                launched: Vec::new(),
            },
        );
        Ok(descriptor)
    }

    fn update_desired_count(
        &self,
        key: &ServiceKey,
        expected: u32,
        desired: u32,
    ) -> Result<ServiceDescriptor, OrchestratorError> {
        let mut guard = self.services.lock().map_err(|_| poisoned())?;
        let record = guard
            .get_mut(key)
            .ok_or_else(|| OrchestratorError::NotFound(key.service_name()))?;
        if record.descriptor.desired_count != expected {
            return Err(OrchestratorError::Conflict {
                service: record.descriptor.name.clone(),
                expected,
                actual: record.descriptor.desired_count,
            });
        }
        record.descriptor.desired_count = desired;
        Ok(record.descriptor.clone())
    }

    fn register_scalable_target(
        &self,
        key: &ServiceKey,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Result<(), OrchestratorError> {
        let mut guard = self.services.lock().map_err(|_| poisoned())?;
        let record = guard
            .get_mut(key)
            .ok_or_else(|| OrchestratorError::NotFound(key.service_name()))?;
        record.scalable_target = Some((min_capacity, max_capacity));
        Ok(())
    }

    fn put_scaling_policy(&self, key: &ServiceKey, policy: &ScalingPolicy) -> Result<(), OrchestratorError> {
        let mut guard = self.services.lock().map_err(|_| poisoned())?;
        let record = guard
            .get_mut(key)
            .ok_or_else(|| OrchestratorError::NotFound(key.service_name()))?;
        if record.scalable_target.is_none() {
            return Err(OrchestratorError::Substrate(format!(
                "{} has no scalable target",
                record.descriptor.name
            )));
        }
        record.policy = Some(policy.clone());
        record.descriptor.scaling_policy = policy.clone();
        Ok(())
    }

    fn launch_worker(&self, key: &ServiceKey, identity: &WorkerIdentity) -> Result<(), OrchestratorError> {
        if take_one(&self.failing_launches) {
            return Err(OrchestratorError::Substrate("injected launch failure".into()));
        }
        let mut guard = self.services.lock().map_err(|_| poisoned())?;
        let record = guard
            .get_mut(key)
            .ok_or_else(|| OrchestratorError::NotFound(key.service_name()))?;
        record.launched.push(identity.clone());
        Ok(())
    }
}
