//! Chunk checkpoint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{ChunkId, RequestId};

/// Processing status of one chunk.
///
/// `Pending` is implicit in practice (absence of a record); it exists so a
/// caller can mark a chunk as claimed before the transform runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Pending,
    Processed,
    Failed,
}

impl ChunkStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ChunkStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!("unknown chunk status '{other}'"))),
        }
    }
}

/// One checkpoint write for `(request_id, chunk_id)`.
///
/// Records are append-only; several may exist for the same key across
/// retries and the most recent one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub request_id: RequestId,
    pub chunk_id: ChunkId,
    pub status: ChunkStatus,
    pub recorded_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn new(request_id: RequestId, chunk_id: ChunkId, status: ChunkStatus) -> Self {
        Self {
            request_id,
            chunk_id,
            status,
            recorded_at: Utc::now(),
        }
    }
}

/// True when `processed` (in any order) is exactly `[0, k)` for some k.
pub fn is_contiguous_prefix(processed: &[ChunkId]) -> bool {
    let mut ids: Vec<u32> = processed.iter().map(|c| c.get()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len() == processed.len() && ids.iter().enumerate().all(|(i, id)| *id as usize == i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_rendering() {
        for status in [ChunkStatus::Pending, ChunkStatus::Processed, ChunkStatus::Failed] {
            assert_eq!(status.as_str().parse::<ChunkStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ChunkStatus>().is_err());
    }

    #[test]
    fn prefix_detection() {
        let ids = |v: &[u32]| v.iter().copied().map(ChunkId::new).collect::<Vec<_>>();
        assert!(is_contiguous_prefix(&ids(&[])));
        assert!(is_contiguous_prefix(&ids(&[2, 0, 1])));
        assert!(!is_contiguous_prefix(&ids(&[0, 2])));
        assert!(!is_contiguous_prefix(&ids(&[1])));
        assert!(!is_contiguous_prefix(&ids(&[0, 0, 1])));
    }
}
