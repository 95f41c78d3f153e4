//! Question answering over a processed request.

use thiserror::Error;
use tracing::{debug, info, instrument};

use docfleet_chunking::ArtifactKey;
use docfleet_core::RequestId;

use crate::blob::{BlobStore, request_bucket};
use crate::model::{Embedder, Generator, ModelError};
use crate::store::StoreError;
use crate::vector::{SearchHit, VectorEntry, VectorStore};

/// Passages retrieved per question.
pub const DEFAULT_K: usize = 5;

const PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
Keep the answer concise. If you don't know the answer, say that you don't know; \
don't try to make up an answer.";
const CONTEXT_MARKER: &str = "Context:\n";
const QUESTION_MARKER: &str = "\n\nQuestion: ";
const ANSWER_MARKER: &str = "\nHelpful Answer:";

/// Render the context/question prompt handed to the generator.
pub fn render_prompt<S: AsRef<str>>(passages: &[S], question: &str) -> String {
    let context = passages
        .iter()
        .map(|p| p.as_ref().trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{PREAMBLE}\n\n{CONTEXT_MARKER}{context}{QUESTION_MARKER}{question}{ANSWER_MARKER}")
}

/// Inverse of [`render_prompt`]: `(context, question)`.
pub fn split_prompt(prompt: &str) -> Option<(&str, &str)> {
    let (_, rest) = prompt.split_once(CONTEXT_MARKER)?;
    let (context, rest) = rest.rsplit_once(QUESTION_MARKER)?;
    let question = rest.strip_suffix(ANSWER_MARKER).unwrap_or(rest);
    Some((context, question.trim()))
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("no indexed chunks for {0}")]
    NotIndexed(RequestId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RetrievalError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Model(e) => e.is_transient(),
            Self::EmptyQuestion | Self::NotIndexed(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Answer {
    pub request_id: RequestId,
    pub text: String,
    pub sources: Vec<SearchHit>,
}

/// Retrieval QA for user-role workers.
pub struct RetrievalService<E, V, B, G> {
    embedder: E,
    vectors: V,
    blobs: B,
    generator: G,
    k: usize,
}

impl<E, V, B, G> RetrievalService<E, V, B, G>
where
    E: Embedder,
    V: VectorStore,
    B: BlobStore,
    G: Generator,
{
    pub fn new(embedder: E, vectors: V, blobs: B, generator: G) -> Self {
        Self {
            embedder,
            vectors,
            blobs,
            generator,
            k: DEFAULT_K,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Restore a request's artifacts from its bucket into the vector store.
    /// Returns how many entries were loaded.
    pub fn load_index(&self, request_id: &RequestId) -> Result<usize, RetrievalError> {
        let bucket = request_bucket(request_id);
        let mut loaded = 0;
        for object in self.blobs.list(&bucket, &ArtifactKey::prefix(request_id))? {
            let Some(raw) = self.blobs.get(&bucket, &object)? else {
                continue;
            };
            let entry: VectorEntry = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::corrupt(format!("{object}: {e}")))?;
            self.vectors.upsert(entry)?;
            loaded += 1;
        }
        info!(request_id = %request_id, loaded, "index restored");
        Ok(loaded)
    }

    #[instrument(skip_all, fields(request_id = %request_id))]
    pub fn answer(&self, request_id: &RequestId, question: &str) -> Result<Answer, RetrievalError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }
        if self.vectors.count(request_id)? == 0 {
            return Err(RetrievalError::NotIndexed(request_id.clone()));
        }

        let query = self.embedder.embed(question)?;
        let sources = self.vectors.search(request_id, &query, self.k)?;
        debug!(hits = sources.len(), "passages retrieved");

        let passages: Vec<&str> = sources.iter().map(|h| h.entry.text.as_str()).collect();
        let text = self.generator.generate(&render_prompt(&passages, question))?;
        Ok(Answer {
            request_id: request_id.clone(),
            text,
            sources,
        })
    }
}
