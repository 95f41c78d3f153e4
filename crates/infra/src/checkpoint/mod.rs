//! Checkpoint store: durable per-chunk processing status.
//!
//! Records are append-only. Several records may exist for one
//! `(request_id, chunk_id)` across retries; the most recent one is the chunk's
//! status. This store is the single source of truth for "done": a chunk whose
//! latest record is `PROCESSED` is never transformed again.

pub mod in_memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use docfleet_core::{ChunkId, ChunkRecord, ChunkStatus, RequestId};

use crate::store::StoreError;

pub use in_memory::InMemoryCheckpointStore;
pub use postgres::PostgresCheckpointStore;

pub trait CheckpointStore: Send + Sync {
    /// Append a status record for `(request_id, chunk_id)`.
    fn record(
        &self,
        request_id: &RequestId,
        chunk_id: ChunkId,
        status: ChunkStatus,
    ) -> Result<(), StoreError>;

    /// Highest chunk whose most recent record is `PROCESSED`, or `None` when
    /// nothing has been processed yet.
    fn last_processed(&self, request_id: &RequestId) -> Result<Option<ChunkId>, StoreError>;

    /// Requests whose most recent record (their last-attempted chunk) is
    /// `FAILED`, sorted by request id. This is the manual-resume worklist.
    fn list_failed(&self) -> Result<Vec<RequestId>, StoreError>;

    /// Every record written for `request_id`, oldest first.
    fn history(&self, request_id: &RequestId) -> Result<Vec<ChunkRecord>, StoreError>;
}

impl<S> CheckpointStore for Arc<S>
where
    S: CheckpointStore + ?Sized,
{
    fn record(
        &self,
        request_id: &RequestId,
        chunk_id: ChunkId,
        status: ChunkStatus,
    ) -> Result<(), StoreError> {
        (**self).record(request_id, chunk_id, status)
    }

    fn last_processed(&self, request_id: &RequestId) -> Result<Option<ChunkId>, StoreError> {
        (**self).last_processed(request_id)
    }

    fn list_failed(&self) -> Result<Vec<RequestId>, StoreError> {
        (**self).list_failed()
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<ChunkRecord>, StoreError> {
        (**self).history(request_id)
    }
}

/// Resolve the latest status per chunk from records given oldest first, and
/// return the highest chunk whose latest status is `PROCESSED`.
pub(crate) fn last_processed_in<'a, I>(records_oldest_first: I) -> Option<ChunkId>
where
    I: IntoIterator<Item = &'a ChunkRecord>,
{
    let mut latest: HashMap<ChunkId, ChunkStatus> = HashMap::new();
    for record in records_oldest_first {
        latest.insert(record.chunk_id, record.status);
    }
    latest
        .into_iter()
        .filter(|(_, status)| *status == ChunkStatus::Processed)
        .map(|(chunk_id, _)| chunk_id)
        .max()
}

/// Chunk ids whose latest status is `PROCESSED`, ascending.
pub fn processed_chunks<S: CheckpointStore + ?Sized>(
    store: &S,
    request_id: &RequestId,
) -> Result<Vec<ChunkId>, StoreError> {
    let mut latest: HashMap<ChunkId, ChunkStatus> = HashMap::new();
    for record in store.history(request_id)? {
        latest.insert(record.chunk_id, record.status);
    }
    let mut processed: Vec<ChunkId> = latest
        .into_iter()
        .filter(|(_, status)| *status == ChunkStatus::Processed)
        .map(|(chunk_id, _)| chunk_id)
        .collect();
    processed.sort();
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(chunk: u32, status: ChunkStatus) -> ChunkRecord {
        ChunkRecord::new(RequestId::new("r").unwrap(), ChunkId::new(chunk), status)
    }

    #[test]
    fn latest_record_per_chunk_wins() {
        let records = vec![
            rec(0, ChunkStatus::Processed),
            rec(1, ChunkStatus::Failed),
            rec(1, ChunkStatus::Processed),
            rec(2, ChunkStatus::Failed),
        ];
        assert_eq!(last_processed_in(&records), Some(ChunkId::new(1)));
    }

    #[test]
    fn rewritten_status_is_not_counted() {
        let records = vec![
            rec(0, ChunkStatus::Processed),
            rec(1, ChunkStatus::Processed),
            rec(1, ChunkStatus::Failed),
        ];
        assert_eq!(last_processed_in(&records), Some(ChunkId::new(0)));
        assert_eq!(last_processed_in(&[]), None);
    }
}
