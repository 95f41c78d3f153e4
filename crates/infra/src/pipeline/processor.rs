//! Chunk processors: turn one chunk into a stored artifact.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use docfleet_chunking::Chunk;
use docfleet_core::RequestId;

use crate::blob::{BlobStore, request_bucket};
use crate::model::{Embedder, ModelError};
use crate::store::StoreError;
use crate::vector::{VectorEntry, VectorStore};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("artifact encoding failed: {0}")]
    Encode(String),
}

impl ProcessError {
    /// A transient failure may succeed when the run is re-invoked.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Model(e) => e.is_transient(),
            Self::Encode(_) => false,
        }
    }
}

/// Transforms a chunk into an artifact and persists it.
///
/// Implementations must be idempotent per `(request_id, chunk.id)`: processing
/// the same chunk twice leaves storage as one call would.
pub trait ChunkProcessor: Send + Sync {
    fn process(&self, request_id: &RequestId, chunk: &Chunk) -> Result<(), ProcessError>;
}

impl<P: ChunkProcessor + ?Sized> ChunkProcessor for Arc<P> {
    fn process(&self, request_id: &RequestId, chunk: &Chunk) -> Result<(), ProcessError> {
        (**self).process(request_id, chunk)
    }
}

/// Embeds the chunk, upserts it into the vector store and writes a durable
/// JSON copy to the request's bucket.
pub struct EmbeddingProcessor<E, V, B> {
    embedder: E,
    vectors: V,
    blobs: B,
}

impl<E, V, B> EmbeddingProcessor<E, V, B>
where
    E: Embedder,
    V: VectorStore,
    B: BlobStore,
{
    pub fn new(embedder: E, vectors: V, blobs: B) -> Self {
        Self {
            embedder,
            vectors,
            blobs,
        }
    }
}

impl<E, V, B> ChunkProcessor for EmbeddingProcessor<E, V, B>
where
    E: Embedder,
    V: VectorStore,
    B: BlobStore,
{
    fn process(&self, request_id: &RequestId, chunk: &Chunk) -> Result<(), ProcessError> {
        let embedding = self.embedder.embed(&chunk.text)?;
        let entry = VectorEntry::new(request_id.clone(), chunk.id, chunk.text.clone(), embedding);

        let bytes = serde_json::to_vec(&entry).map_err(|e| ProcessError::Encode(e.to_string()))?;
        let object = entry.key.object_name();
        self.vectors.upsert(entry)?;
        self.blobs.put(&request_bucket(request_id), &object, bytes)?;

        debug!(request_id = %request_id, chunk_id = %chunk.id, object = %object, "chunk artifact stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::model::HashEmbedder;
    use crate::vector::InMemoryVectorStore;
    use docfleet_core::ChunkId;

    #[test]
    fn artifact_lands_in_vector_store_and_bucket() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let processor = EmbeddingProcessor::new(HashEmbedder::new(32), vectors.clone(), blobs.clone());
        let r = RequestId::new("manual").unwrap();
        let chunk = Chunk {
            id: ChunkId::new(4),
            page: 0,
            text: "install the pump".into(),
        };

        processor.process(&r, &chunk).unwrap();

        assert_eq!(vectors.count(&r).unwrap(), 1);
        let raw = blobs.get("docfleet-manual", "vs_manual_4.json").unwrap().unwrap();
        let stored: VectorEntry = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.text, "install the pump");
        assert_eq!(stored.chunk_id, ChunkId::new(4));
    }

    #[test]
    fn model_rejection_is_terminal() {
        let processor = EmbeddingProcessor::new(
            HashEmbedder::new(8),
            InMemoryVectorStore::new(),
            InMemoryBlobStore::new(),
        );
        let chunk = Chunk {
            id: ChunkId::FIRST,
            page: 0,
            text: "...".into(),
        };
        let err = processor
            .process(&RequestId::new("r").unwrap(), &chunk)
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
