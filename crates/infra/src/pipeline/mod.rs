//! Resumable pipeline driver.
//!
//! Splits a document deterministically, resumes after the highest chunk the
//! checkpoint store reports as processed, and processes the rest strictly in
//! order. The first failing chunk is recorded `FAILED` and ends the run, so
//! processed chunk ids always form a prefix `[0, k)`.
//!
//! There is no in-process retry loop: a failed or interrupted run is retried
//! by calling [`PipelineDriver::run`] again with the same request id.

pub mod processor;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use docfleet_chunking::{ChunkingError, Document, RecursiveSplitter};
use docfleet_core::{ChunkId, ChunkStatus, RequestId};

use crate::checkpoint::CheckpointStore;
use crate::store::StoreError;

pub use processor::{ChunkProcessor, EmbeddingProcessor, ProcessError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] StoreError),

    #[error("document could not be split: {0}")]
    Split(#[from] ChunkingError),

    #[error("chunk {chunk_id} failed: {message}")]
    ChunkFailed {
        chunk_id: ChunkId,
        /// The failure was transient; re-invoking `run` may get past it.
        retryable: bool,
        message: String,
    },

    /// The store says more chunks were processed than the document now has.
    /// Happens when the document or splitter settings changed between runs.
    #[error("checkpoint for {request_id} is at chunk {last_processed} but the document splits into {chunk_count} chunks")]
    CheckpointAhead {
        request_id: RequestId,
        last_processed: ChunkId,
        chunk_count: usize,
    },
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Checkpoint(e) => e.is_transient(),
            Self::ChunkFailed { retryable, .. } => *retryable,
            Self::Split(_) | Self::CheckpointAhead { .. } => false,
        }
    }

    /// Actionable hint for whoever reads the error.
    pub fn next_step(&self, request_id: &RequestId) -> String {
        match self {
            Self::CheckpointAhead { .. } => format!(
                "resubmit the document under a new name; {request_id} was split with different settings"
            ),
            _ if self.is_retryable() => format!("select {request_id} to resume processing"),
            _ => format!("fix the document and resubmit, or select {request_id} to resume"),
        }
    }
}

/// Drives a [`ChunkProcessor`] over a document against a checkpoint store.
pub struct PipelineDriver<C, P> {
    checkpoints: C,
    processor: P,
    splitter: RecursiveSplitter,
}

impl<C, P> PipelineDriver<C, P>
where
    C: CheckpointStore,
    P: ChunkProcessor,
{
    pub fn new(checkpoints: C, processor: P, splitter: RecursiveSplitter) -> Self {
        Self {
            checkpoints,
            processor,
            splitter,
        }
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    pub fn splitter(&self) -> &RecursiveSplitter {
        &self.splitter
    }

    /// Process every chunk after the last checkpoint; returns how many chunks
    /// this invocation processed.
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub fn run(&self, document: &Document, request_id: &RequestId) -> Result<usize, PipelineError> {
        let chunks = document.split(&self.splitter)?;
        let last = self.checkpoints.last_processed(request_id)?;
        let start = last.map(ChunkId::next).unwrap_or(ChunkId::FIRST);

        if start.as_index() > chunks.len() {
            let last_processed = last.unwrap_or(ChunkId::FIRST);
            error!(%last_processed, chunk_count = chunks.len(), "checkpoint ahead of document");
            return Err(PipelineError::CheckpointAhead {
                request_id: request_id.clone(),
                last_processed,
                chunk_count: chunks.len(),
            });
        }

        info!(
            chunk_count = chunks.len(),
            resume_from = %start,
            "pipeline run starting"
        );

        let mut processed = 0usize;
        for chunk in &chunks[start.as_index()..] {
            match self.processor.process(request_id, chunk) {
                Ok(()) => {
                    // A crash before this write means the chunk is reprocessed on
                    // resume; processors overwrite by key, so that is harmless.
                    self.checkpoints
                        .record(request_id, chunk.id, ChunkStatus::Processed)?;
                    processed += 1;
                }
                Err(e) => {
                    let retryable = e.is_transient();
                    warn!(chunk_id = %chunk.id, retryable, error = %e, "chunk failed; stopping run");
                    if let Err(store_err) =
                        self.checkpoints.record(request_id, chunk.id, ChunkStatus::Failed)
                    {
                        error!(chunk_id = %chunk.id, error = %store_err, "could not record chunk failure");
                    }
                    return Err(PipelineError::ChunkFailed {
                        chunk_id: chunk.id,
                        retryable,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(processed, "pipeline run complete");
        Ok(processed)
    }
}
