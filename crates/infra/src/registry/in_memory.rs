use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use docfleet_core::{ContainerId, WorkerHeartbeat, WorkerInfo};

use super::WorkerRegistry;
use crate::store::StoreError;

/// In-memory worker registry for tests/dev.
///
/// `set_unavailable(true)` makes every call fail with
/// `StoreError::Unavailable` until cleared.
#[derive(Debug, Default)]
pub struct InMemoryWorkerRegistry {
    info: RwLock<BTreeMap<ContainerId, WorkerInfo>>,
    heartbeats: RwLock<BTreeMap<ContainerId, WorkerHeartbeat>>,
    unavailable: AtomicBool,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("registry unavailable"));
        }
        Ok(())
    }
}

impl WorkerRegistry for InMemoryWorkerRegistry {
    fn put_worker_info(&self, info: &WorkerInfo) -> Result<(), StoreError> {
        self.check_available()?;
        let mut guard = self.info.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert(info.container_id.clone(), info.clone());
        Ok(())
    }

    fn get_worker_info(&self, container_id: &ContainerId) -> Result<Option<WorkerInfo>, StoreError> {
        self.check_available()?;
        let guard = self.info.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(container_id).cloned())
    }

    fn list_worker_info(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        self.check_available()?;
        let guard = self.info.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.values().cloned().collect())
    }

    fn put_heartbeat(&self, heartbeat: &WorkerHeartbeat) -> Result<(), StoreError> {
        self.check_available()?;
        let mut guard = self.heartbeats.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert(heartbeat.container_id.clone(), heartbeat.clone());
        Ok(())
    }

    fn get_heartbeat(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<WorkerHeartbeat>, StoreError> {
        self.check_available()?;
        let guard = self.heartbeats.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(container_id).cloned())
    }

    fn list_heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        self.check_available()?;
        let guard = self.heartbeats.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.values().cloned().collect())
    }
}
