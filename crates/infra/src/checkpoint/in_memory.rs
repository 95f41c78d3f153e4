use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use docfleet_core::{ChunkId, ChunkRecord, ChunkStatus, RequestId};

use super::{CheckpointStore, last_processed_in};
use crate::store::StoreError;

/// In-memory checkpoint store for tests/dev.
///
/// Supports fault injection: `fail_next_writes(n)` makes the next `n` calls to
/// `record` fail with `StoreError::Unavailable`.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    inner: RwLock<HashMap<RequestId, Vec<ChunkRecord>>>,
    failing_writes: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn record(
        &self,
        request_id: &RequestId,
        chunk_id: ChunkId,
        status: ChunkStatus,
    ) -> Result<(), StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::unavailable("injected checkpoint write failure"));
        }
        let mut guard = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        guard
            .entry(request_id.clone())
            .or_default()
            .push(ChunkRecord::new(request_id.clone(), chunk_id, status));
        Ok(())
    }

    fn last_processed(&self, request_id: &RequestId) -> Result<Option<ChunkId>, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(request_id).and_then(|records| last_processed_in(records)))
    }

    fn list_failed(&self) -> Result<Vec<RequestId>, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut failed: Vec<RequestId> = guard
            .iter()
            .filter(|(_, records)| {
                records
                    .last()
                    .is_some_and(|r| r.status == ChunkStatus::Failed)
            })
            .map(|(request_id, _)| request_id.clone())
            .collect();
        failed.sort();
        Ok(failed)
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<ChunkRecord>, StoreError> {
        let guard = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(request_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> RequestId {
        RequestId::new(s).unwrap()
    }

    #[test]
    fn empty_request_has_no_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(store.last_processed(&rid("nothing")).unwrap(), None);
        assert!(store.history(&rid("nothing")).unwrap().is_empty());
        assert!(store.list_failed().unwrap().is_empty());
    }

    #[test]
    fn last_processed_tracks_highest_processed_chunk() {
        let store = InMemoryCheckpointStore::new();
        let r = rid("r1");
        store.record(&r, ChunkId::new(0), ChunkStatus::Processed).unwrap();
        store.record(&r, ChunkId::new(1), ChunkStatus::Processed).unwrap();
        store.record(&r, ChunkId::new(2), ChunkStatus::Failed).unwrap();

        assert_eq!(store.last_processed(&r).unwrap(), Some(ChunkId::new(1)));
        assert_eq!(store.history(&r).unwrap().len(), 3);
    }

    #[test]
    fn list_failed_reflects_latest_record_only() {
        let store = InMemoryCheckpointStore::new();
        let (a, b, c) = (rid("a"), rid("b"), rid("c"));

        store.record(&b, ChunkId::new(0), ChunkStatus::Failed).unwrap();
        store.record(&a, ChunkId::new(0), ChunkStatus::Processed).unwrap();
        store.record(&a, ChunkId::new(1), ChunkStatus::Failed).unwrap();
        store.record(&c, ChunkId::new(0), ChunkStatus::Failed).unwrap();
        store.record(&c, ChunkId::new(0), ChunkStatus::Processed).unwrap();

        assert_eq!(store.list_failed().unwrap(), vec![a, b]);
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let store = InMemoryCheckpointStore::new();
        let r = rid("r");
        store.fail_next_writes(1);

        let err = store
            .record(&r, ChunkId::FIRST, ChunkStatus::Processed)
            .unwrap_err();
        assert!(err.is_transient());
        store.record(&r, ChunkId::FIRST, ChunkStatus::Processed).unwrap();
        assert_eq!(store.last_processed(&r).unwrap(), Some(ChunkId::FIRST));
    }
}
