//! Vector store: chunk artifacts (text + embedding) searchable per request.
//!
//! Entries are keyed by [`ArtifactKey`], so writing the same chunk twice leaves
//! the store exactly as a single write would.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use docfleet_chunking::ArtifactKey;
use docfleet_core::{ChunkId, RequestId};

use crate::store::StoreError;

/// One stored chunk artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub key: ArtifactKey,
    pub request_id: RequestId,
    pub chunk_id: ChunkId,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    pub fn new(request_id: RequestId, chunk_id: ChunkId, text: String, embedding: Vec<f32>) -> Self {
        Self {
            key: ArtifactKey::new(&request_id, chunk_id),
            request_id,
            chunk_id,
            text,
            embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entry: VectorEntry,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    /// Insert or overwrite by `entry.key`.
    fn upsert(&self, entry: VectorEntry) -> Result<(), StoreError>;

    /// Top `k` entries of `request_id` by cosine similarity to `query`.
    fn search(
        &self,
        request_id: &RequestId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    fn count(&self, request_id: &RequestId) -> Result<usize, StoreError>;
}

impl<V> VectorStore for Arc<V>
where
    V: VectorStore + ?Sized,
{
    fn upsert(&self, entry: VectorEntry) -> Result<(), StoreError> {
        (**self).upsert(entry)
    }

    fn search(
        &self,
        request_id: &RequestId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        (**self).search(request_id, query, k)
    }

    fn count(&self, request_id: &RequestId) -> Result<usize, StoreError> {
        (**self).count(request_id)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// In-memory vector store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<BTreeMap<ArtifactKey, VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries ordered by key; used to compare store states in tests.
    pub fn snapshot(&self) -> Result<Vec<VectorEntry>, StoreError> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.values().cloned().collect())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, entry: VectorEntry) -> Result<(), StoreError> {
        let mut guard = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn search(
        &self,
        request_id: &RequestId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut hits: Vec<SearchHit> = guard
            .values()
            .filter(|e| &e.request_id == request_id)
            .map(|e| SearchHit {
                score: cosine(&e.embedding, query),
                entry: e.clone(),
            })
            .collect();
        // Highest score first; chunk order breaks ties so results are stable.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn count(&self, request_id: &RequestId) -> Result<usize, StoreError> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.values().filter(|e| &e.request_id == request_id).count())
    }
}
