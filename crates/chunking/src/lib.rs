//! Chunking domain module.
//!
//! Splits documents into ordered chunks and derives the storage keys of the
//! artifacts produced from them. Everything here is deterministic and free of
//! IO: the same document with the same parameters always yields the same chunk
//! sequence, which is what makes resume-from-checkpoint sound.

pub mod artifact;
pub mod document;
pub mod splitter;

pub use artifact::ArtifactKey;
pub use document::{Chunk, Document};
pub use splitter::{ChunkingError, RecursiveSplitter};
