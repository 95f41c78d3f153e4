//! Storage keys for per-chunk artifacts.

use serde::{Deserialize, Serialize};

use docfleet_core::{ChunkId, RequestId};

/// Key an artifact is written under. Derived only from `(request_id,
/// chunk_id)`, so re-processing a chunk overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(request_id: &RequestId, chunk_id: ChunkId) -> Self {
        Self(format!("vs_{}_{}", request_id, chunk_id))
    }

    /// Key prefix shared by every artifact of `request_id`.
    pub fn prefix(request_id: &RequestId) -> String {
        format!("vs_{}_", request_id)
    }

    /// Object name of the serialized artifact in blob storage.
    pub fn object_name(&self) -> String {
        format!("{}.json", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_per_request_and_chunk() {
        let r = RequestId::new("report").unwrap();
        let a = ArtifactKey::new(&r, ChunkId::new(3));
        assert_eq!(a, ArtifactKey::new(&r, ChunkId::new(3)));
        assert_eq!(a.as_str(), "vs_report_3");
        assert_eq!(a.object_name(), "vs_report_3.json");
        assert!(a.as_str().starts_with(&ArtifactKey::prefix(&r)));
    }
}
