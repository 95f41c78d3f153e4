//! Recursive character splitter with fixed target size and overlap.
//!
//! The text is split on the coarsest separator present (paragraphs, then
//! lines, then words, then characters). Pieces that fit are greedily merged
//! back into chunks of at most `chunk_size` characters, carrying up to
//! `chunk_overlap` characters of trailing context into the next chunk. Pieces
//! that are still too large are split again with the next finer separator.
//!
//! Lengths are measured in `char`s, not bytes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separators tried in order. The empty separator splits into characters and
/// always terminates the recursion.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("invalid splitter configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk index {index} does not fit a chunk id")]
    TooManyChunks { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list. A trailing empty separator is appended when
    /// missing so every piece can eventually be split.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seps: Vec<String> = separators.into_iter().map(Into::into).collect();
        if seps.last().is_none_or(|s| !s.is_empty()) {
            seps.push(String::new());
        }
        self.separators = seps;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(s.as_str()))
            .map(|(i, s)| (i, s.as_str()))
            .unwrap_or((separators.len(), ""));
        let finer = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                if let Some(doc) = join_trimmed(&window, separator) {
                    docs.push(doc);
                }
                // Drop from the front until only the overlap remains and the
                // next piece fits.
                while let Some(first) = window.front() {
                    let over_overlap = total > self.chunk_overlap;
                    // The window is non-empty here, so the next piece always
                    // needs a separator.
                    let would_overflow = total + len + sep_len > self.chunk_size && total > 0;
                    if !(over_overlap || would_overflow) {
                        break;
                    }
                    let trailing = if window.len() > 1 { sep_len } else { 0 };
                    total = total.saturating_sub(char_len(first) + trailing);
                    window.pop_front();
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_trimmed(&window, separator) {
            docs.push(doc);
        }
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            RecursiveSplitter::new(100, 100),
            Err(ChunkingError::InvalidConfig(_))
        ));
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = RecursiveSplitter::new(1000, 200).unwrap();
        assert_eq!(splitter.split_text("hello world"), vec!["hello world"]);
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        let splitter = RecursiveSplitter::new(10, 2).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn words_are_merged_with_overlap() {
        let splitter = RecursiveSplitter::new(10, 4).unwrap();
        let chunks = splitter.split_text("aaa bbb ccc ddd eee");
        assert_eq!(chunks, vec!["aaa bbb", "bbb ccc", "ccc ddd", "ddd eee"]);
    }

    #[test]
    fn overlap_window_keeps_pieces_that_leave_room_for_the_next() {
        let splitter = RecursiveSplitter::new(10, 4).unwrap();
        assert_eq!(splitter.split_text("aaaa bbbb cccc"), vec!["aaaa bbbb", "bbbb cccc"]);

        // Nothing fits beside the next piece, so the window empties.
        let splitter = RecursiveSplitter::new(5, 0).unwrap();
        assert_eq!(splitter.split_text("aaaa bbbb"), vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let chunks = splitter.split_text("first paragraph\n\nsecond paragraph");
        assert_eq!(chunks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn oversized_words_fall_back_to_characters() {
        let splitter = RecursiveSplitter::new(4, 0).unwrap();
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let splitter = RecursiveSplitter::new(3, 0).unwrap();
        let chunks = splitter.split_text("äöüßé");
        assert_eq!(chunks, vec!["äöü", "ßé"]);
    }

    #[test]
    fn custom_separators_gain_a_character_fallback() {
        let splitter = RecursiveSplitter::new(5, 0)
            .unwrap()
            .with_separators(["|"]);
        assert_eq!(splitter.split_text("ab|cd|efghijk"), vec!["ab|cd", "efghi", "jk"]);
    }
}
