//! Document submission and manual resume on top of the pipeline driver.

use thiserror::Error;
use tracing::{info, warn};

use docfleet_chunking::Document;
use docfleet_core::{DomainError, RequestId};

use crate::blob::{BlobStore, request_bucket};
use crate::checkpoint::CheckpointStore;
use crate::pipeline::{ChunkProcessor, PipelineDriver, PipelineError};
use crate::store::StoreError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    #[error("invalid document name: {0}")]
    InvalidName(#[from] DomainError),

    #[error("a document named {0} already exists")]
    Duplicate(RequestId),

    #[error("no stored source for {0}")]
    UnknownRequest(RequestId),

    #[error("stored source for {0} is not valid UTF-8")]
    CorruptSource(RequestId),

    #[error("blob store: {0}")]
    Blob(StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IngestError {
    pub fn next_step(&self, request_id: Option<&RequestId>) -> String {
        match (self, request_id) {
            (Self::InvalidName(_), _) => {
                "choose a different name without spaces, slashes or a leading dot".to_string()
            }
            (Self::Duplicate(_), _) => "choose a different name".to_string(),
            (Self::UnknownRequest(_), _) => "submit the document first".to_string(),
            (Self::CorruptSource(_), _) => "resubmit the document under a new name".to_string(),
            (Self::Pipeline(e), Some(r)) => e.next_step(r),
            (_, Some(r)) => format!("select {r} to resume"),
            (_, None) => "retry the request".to_string(),
        }
    }
}

/// Outcome of a submit or resume call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub request_id: RequestId,
    pub chunks_processed: usize,
}

pub struct IngestionService<C, P, B> {
    driver: PipelineDriver<C, P>,
    blobs: B,
}

/// Object key of a request's source document.
pub fn source_key(request_id: &RequestId) -> String {
    format!("{}.txt", request_id)
}

impl<C, P, B> IngestionService<C, P, B>
where
    C: CheckpointStore,
    P: ChunkProcessor,
    B: BlobStore,
{
    pub fn new(driver: PipelineDriver<C, P>, blobs: B) -> Self {
        Self { driver, blobs }
    }

    pub fn driver(&self) -> &PipelineDriver<C, P> {
        &self.driver
    }

    /// Store `text` under the document name and run the pipeline over it.
    /// The name becomes the request id.
    pub fn submit(&self, name: &str, text: &str) -> Result<IngestReport, IngestError> {
        let request_id = RequestId::new(name)?;
        let bucket = request_bucket(&request_id);

        let existing = self
            .blobs
            .list(&bucket, request_id.as_str())
            .map_err(IngestError::Blob)?;
        if !existing.is_empty() {
            warn!(request_id = %request_id, "duplicate document name rejected");
            return Err(IngestError::Duplicate(request_id));
        }

        self.blobs
            .put(&bucket, &source_key(&request_id), text.as_bytes().to_vec())
            .map_err(IngestError::Blob)?;
        info!(request_id = %request_id, bytes = text.len(), "document stored");

        self.run(request_id, &Document::from_form_fed(text))
    }

    /// Reload the stored source and re-invoke the pipeline; finished chunks
    /// are skipped.
    pub fn resume(&self, request_id: &RequestId) -> Result<IngestReport, IngestError> {
        let raw = self
            .blobs
            .get(&request_bucket(request_id), &source_key(request_id))
            .map_err(IngestError::Blob)?
            .ok_or_else(|| IngestError::UnknownRequest(request_id.clone()))?;
        let text = String::from_utf8(raw).map_err(|_| IngestError::CorruptSource(request_id.clone()))?;
        info!(request_id = %request_id, "resuming request");
        self.run(request_id.clone(), &Document::from_form_fed(&text))
    }

    /// Requests waiting for a manual resume.
    pub fn failed_requests(&self) -> Result<Vec<RequestId>, IngestError> {
        self.driver
            .checkpoints()
            .list_failed()
            .map_err(|e| IngestError::Pipeline(PipelineError::Checkpoint(e)))
    }

    fn run(&self, request_id: RequestId, document: &Document) -> Result<IngestReport, IngestError> {
        let chunks_processed = self.driver.run(document, &request_id)?;
        Ok(IngestReport {
            request_id,
            chunks_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use docfleet_chunking::RecursiveSplitter;
    use docfleet_core::{ChunkId, ChunkStatus};

    use crate::blob::InMemoryBlobStore;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::model::HashEmbedder;
    use crate::pipeline::EmbeddingProcessor;
    use crate::vector::{InMemoryVectorStore, VectorStore};

    type Service = IngestionService<
        Arc<InMemoryCheckpointStore>,
        EmbeddingProcessor<HashEmbedder, Arc<InMemoryVectorStore>, Arc<InMemoryBlobStore>>,
        Arc<InMemoryBlobStore>,
    >;

    struct Fixture {
        service: Service,
        checkpoints: Arc<InMemoryCheckpointStore>,
        vectors: Arc<InMemoryVectorStore>,
        blobs: Arc<InMemoryBlobStore>,
    }

    fn fixture() -> Fixture {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let processor = EmbeddingProcessor::new(HashEmbedder::new(64), vectors.clone(), blobs.clone());
        let driver = PipelineDriver::new(
            checkpoints.clone(),
            processor,
            RecursiveSplitter::new(40, 10).unwrap(),
        );
        Fixture {
            service: IngestionService::new(driver, blobs.clone()),
            checkpoints,
            vectors,
            blobs,
        }
    }

    const TEXT: &str = "Pumps must be primed before use.\n\nCheck the seals every month.\n\nReplace filters twice a year.";

    #[test]
    fn submit_stores_source_and_artifacts() {
        let f = fixture();
        let report = f.service.submit("pump-manual", TEXT).unwrap();

        assert_eq!(report.request_id.as_str(), "pump-manual");
        assert!(report.chunks_processed >= 3);
        assert_eq!(
            f.blobs.get("docfleet-pump-manual", "pump-manual.txt").unwrap(),
            Some(TEXT.as_bytes().to_vec())
        );
        let artifacts = f.blobs.list("docfleet-pump-manual", "vs_pump-manual_").unwrap();
        assert_eq!(artifacts.len(), report.chunks_processed);
        assert_eq!(f.vectors.count(&report.request_id).unwrap(), report.chunks_processed);
    }

    #[test]
    fn names_with_spaces_and_duplicates_are_rejected() {
        let f = fixture();
        let err = f.service.submit("pump manual", TEXT).unwrap_err();
        assert!(matches!(err, IngestError::InvalidName(_)));
        assert_eq!(
            err.next_step(None),
            "choose a different name without spaces, slashes or a leading dot"
        );

        f.service.submit("manual", TEXT).unwrap();
        let dup = f.service.submit("manual", "other text").unwrap_err();
        assert_eq!(dup, IngestError::Duplicate(RequestId::new("manual").unwrap()));
        assert_eq!(dup.next_step(None), "choose a different name");
    }

    #[test]
    fn path_like_names_are_rejected_before_anything_is_stored() {
        let f = fixture();
        for name in ["reports/q1", "reports\\q1", ".hidden"] {
            let err = f.service.submit(name, TEXT).unwrap_err();
            assert!(matches!(err, IngestError::InvalidName(_)), "{name:?}: {err:?}");
            assert!(err.next_step(None).starts_with("choose a different name"));
        }
        assert!(f.blobs.is_empty());
        assert_eq!(f.service.failed_requests().unwrap(), Vec::<RequestId>::new());
    }

    #[test]
    fn interrupted_submit_resumes_from_stored_source() {
        let f = fixture();
        let r = RequestId::new("handbook").unwrap();
        f.checkpoints.fail_next_writes(1);

        let err = f.service.submit("handbook", TEXT).unwrap_err();
        assert!(matches!(err, IngestError::Pipeline(PipelineError::Checkpoint(_))));
        assert_eq!(err.next_step(Some(&r)), "select handbook to resume processing");

        let report = f.service.resume(&r).unwrap();
        assert!(report.chunks_processed >= 3);
        let last = f.checkpoints.last_processed(&r).unwrap().unwrap();
        assert_eq!(last.as_index() + 1, report.chunks_processed);
    }

    #[test]
    fn failed_requests_lists_only_requests_ending_in_failure() {
        let f = fixture();
        let (r1, r2) = (RequestId::new("r1").unwrap(), RequestId::new("r2").unwrap());
        for c in 0..3 {
            f.checkpoints.record(&r1, ChunkId::new(c), ChunkStatus::Processed).unwrap();
        }
        f.checkpoints.record(&r1, ChunkId::new(3), ChunkStatus::Failed).unwrap();
        for c in 0..5 {
            f.checkpoints.record(&r2, ChunkId::new(c), ChunkStatus::Processed).unwrap();
        }

        assert_eq!(f.service.failed_requests().unwrap(), vec![r1]);
    }

    #[test]
    fn resume_of_unknown_request_fails_cleanly() {
        let f = fixture();
        let r = RequestId::new("ghost").unwrap();
        assert_eq!(f.service.resume(&r), Err(IngestError::UnknownRequest(r)));
    }
}
