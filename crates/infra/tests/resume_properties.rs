use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use proptest::prelude::*;

use docfleet_chunking::{Chunk, Document, RecursiveSplitter};
use docfleet_core::{ChunkId, ChunkStatus, RequestId};
use docfleet_infra::blob::InMemoryBlobStore;
use docfleet_infra::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use docfleet_infra::model::HashEmbedder;
use docfleet_infra::pipeline::{ChunkProcessor, EmbeddingProcessor, PipelineDriver, ProcessError};
use docfleet_infra::store::StoreError;
use docfleet_infra::vector::InMemoryVectorStore;

type Inner = EmbeddingProcessor<HashEmbedder, Arc<InMemoryVectorStore>, Arc<InMemoryBlobStore>>;

/// Fails the first attempt at one chunk, then behaves.
struct FailOnce {
    inner: Inner,
    fail_at: ChunkId,
    armed: AtomicBool,
}

impl ChunkProcessor for FailOnce {
    fn process(&self, request_id: &RequestId, chunk: &Chunk) -> Result<(), ProcessError> {
        if chunk.id == self.fail_at && self.armed.swap(false, Ordering::SeqCst) {
            return Err(ProcessError::Store(StoreError::unavailable("injected outage")));
        }
        self.inner.process(request_id, chunk)
    }
}

fn document(paragraphs: usize) -> Document {
    let text = (0..paragraphs)
        .map(|i| format!("paragraph {i} talks about topic{i}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    Document::from_text(text)
}

fn splitter() -> RecursiveSplitter {
    RecursiveSplitter::new(40, 0).unwrap()
}

fn embedding_processor(vectors: &Arc<InMemoryVectorStore>, blobs: &Arc<InMemoryBlobStore>) -> Inner {
    EmbeddingProcessor::new(HashEmbedder::new(32), vectors.clone(), blobs.clone())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: a run interrupted at any chunk and then resumed ends with the
    /// same artifacts as an uninterrupted run, and every chunk has exactly one
    /// PROCESSED record.
    #[test]
    fn resume_after_any_failure_matches_clean_run(paragraphs in 1usize..12, fail_seed in 0usize..100) {
        let doc = document(paragraphs);
        let chunk_count = doc.split(&splitter()).unwrap().len();
        prop_assume!(chunk_count > 0);
        let fail_at = ChunkId::new((fail_seed % chunk_count) as u32);
        let r = RequestId::new("prop-doc").unwrap();

        let clean_vectors = Arc::new(InMemoryVectorStore::new());
        let clean_blobs = Arc::new(InMemoryBlobStore::new());
        let clean = PipelineDriver::new(
            InMemoryCheckpointStore::new(),
            embedding_processor(&clean_vectors, &clean_blobs),
            splitter(),
        );
        prop_assert_eq!(clean.run(&doc, &r).unwrap(), chunk_count);

        let vectors = Arc::new(InMemoryVectorStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let driver = PipelineDriver::new(
            checkpoints.clone(),
            FailOnce {
                inner: embedding_processor(&vectors, &blobs),
                fail_at,
                armed: AtomicBool::new(true),
            },
            splitter(),
        );

        let err = driver.run(&doc, &r).unwrap_err();
        prop_assert!(err.is_retryable());
        prop_assert_eq!(checkpoints.list_failed().unwrap(), vec![r.clone()]);

        let resumed = driver.run(&doc, &r).unwrap();
        prop_assert_eq!(resumed, chunk_count - fail_at.as_index());
        prop_assert_eq!(vectors.snapshot().unwrap(), clean_vectors.snapshot().unwrap());
        prop_assert!(checkpoints.list_failed().unwrap().is_empty());

        let history = checkpoints.history(&r).unwrap();
        for c in 0..chunk_count {
            let processed = history
                .iter()
                .filter(|rec| rec.chunk_id.as_index() == c && rec.status == ChunkStatus::Processed)
                .count();
            prop_assert_eq!(processed, 1, "chunk {} processed {} times", c, processed);
        }
        prop_assert_eq!(
            checkpoints.last_processed(&r).unwrap(),
            Some(ChunkId::new((chunk_count - 1) as u32))
        );
    }
}
