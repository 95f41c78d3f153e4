//! Worker registry: static worker info plus the latest heartbeat per worker.
//!
//! Container ids are unique across the registry; the fleet controller consults
//! it before handing an id to a new worker.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use docfleet_core::{ContainerId, WorkerHeartbeat, WorkerInfo};

use crate::store::StoreError;

pub use in_memory::InMemoryWorkerRegistry;
pub use postgres::PostgresWorkerRegistry;

pub trait WorkerRegistry: Send + Sync {
    /// Insert or overwrite the info record for `info.container_id`.
    fn put_worker_info(&self, info: &WorkerInfo) -> Result<(), StoreError>;

    fn get_worker_info(&self, container_id: &ContainerId) -> Result<Option<WorkerInfo>, StoreError>;

    fn list_worker_info(&self) -> Result<Vec<WorkerInfo>, StoreError>;

    /// Upsert: a worker only ever has its latest heartbeat.
    fn put_heartbeat(&self, heartbeat: &WorkerHeartbeat) -> Result<(), StoreError>;

    fn get_heartbeat(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<WorkerHeartbeat>, StoreError>;

    fn list_heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, StoreError>;

    /// True if `container_id` is already taken by a registered worker.
    fn is_known(&self, container_id: &ContainerId) -> Result<bool, StoreError> {
        Ok(self.get_worker_info(container_id)?.is_some())
    }
}

impl<R> WorkerRegistry for Arc<R>
where
    R: WorkerRegistry + ?Sized,
{
    fn put_worker_info(&self, info: &WorkerInfo) -> Result<(), StoreError> {
        (**self).put_worker_info(info)
    }

    fn get_worker_info(&self, container_id: &ContainerId) -> Result<Option<WorkerInfo>, StoreError> {
        (**self).get_worker_info(container_id)
    }

    fn list_worker_info(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        (**self).list_worker_info()
    }

    fn put_heartbeat(&self, heartbeat: &WorkerHeartbeat) -> Result<(), StoreError> {
        (**self).put_heartbeat(heartbeat)
    }

    fn get_heartbeat(
        &self,
        container_id: &ContainerId,
    ) -> Result<Option<WorkerHeartbeat>, StoreError> {
        (**self).get_heartbeat(container_id)
    }

    fn list_heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        (**self).list_heartbeats()
    }

    fn is_known(&self, container_id: &ContainerId) -> Result<bool, StoreError> {
        (**self).is_known(container_id)
    }
}
