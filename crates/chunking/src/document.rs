//! Documents and the ordered chunks they split into.

use serde::{Deserialize, Serialize};

use docfleet_core::ChunkId;

use crate::splitter::{ChunkingError, RecursiveSplitter};

/// A document to ingest, as a sequence of pages of extracted text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pages: Vec<String>,
}

impl Document {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            pages: vec![text.into()],
        }
    }

    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// Pages separated by form feeds (`\x0c`), the way text extractors emit
    /// page breaks.
    pub fn from_form_fed(text: &str) -> Self {
        Self::from_pages(text.split('\x0c'))
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }

    /// Split every page in order; chunk ids run densely across pages from 0.
    pub fn split(&self, splitter: &RecursiveSplitter) -> Result<Vec<Chunk>, ChunkingError> {
        let mut chunks = Vec::new();
        for (page, text) in self.pages.iter().enumerate() {
            for piece in splitter.split_text(text) {
                chunks.push(Chunk {
                    id: chunk_id(chunks.len())?,
                    page,
                    text: piece,
                });
            }
        }
        Ok(chunks)
    }
}

fn chunk_id(index: usize) -> Result<ChunkId, ChunkingError> {
    u32::try_from(index)
        .map(ChunkId::new)
        .map_err(|_| ChunkingError::TooManyChunks { index })
}

/// One unit of work cut from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Zero-based page the chunk was cut from.
    pub page: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_dense_across_pages() {
        let splitter = RecursiveSplitter::new(8, 0).unwrap();
        let doc = Document::from_pages(["one two three", "four"]);
        let chunks = doc.split(&splitter).unwrap();

        let ids: Vec<u32> = chunks.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, (0..chunks.len() as u32).collect::<Vec<_>>());
        assert_eq!(chunks.last().unwrap().page, 1);
        assert_eq!(chunks.last().unwrap().text, "four");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn chunk_index_beyond_id_range_is_an_error() {
        assert_eq!(chunk_id(7).unwrap(), ChunkId::new(7));
        let index = u32::MAX as usize + 1;
        assert_eq!(chunk_id(index), Err(ChunkingError::TooManyChunks { index }));
    }

    #[test]
    fn form_feeds_become_pages() {
        let doc = Document::from_form_fed("page one\x0cpage two");
        assert_eq!(doc.pages().len(), 2);
        assert!(!doc.is_empty());
        assert!(Document::from_text("  ").is_empty());
    }
}
