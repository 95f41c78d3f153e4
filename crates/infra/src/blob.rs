//! Object storage for uploaded documents and per-chunk artifacts.
//!
//! Objects live in flat buckets; `put` to an existing key overwrites it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use docfleet_core::RequestId;

use crate::store::StoreError;

/// Bucket holding the source document and all artifacts of one request.
pub fn request_bucket(request_id: &RequestId) -> String {
    format!("docfleet-{}", request_id)
}

pub trait BlobStore: Send + Sync {
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Keys in `bucket` starting with `prefix`, sorted.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

impl<B> BlobStore for Arc<B>
where
    B: BlobStore + ?Sized,
{
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(bucket, key, bytes)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(bucket, key)
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(bucket, prefix)
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() || value.starts_with('.') || value.contains('/') || value.contains('\\') {
        return Err(StoreError::InvalidKey(format!("{kind} {value:?}")));
    }
    Ok(())
}

/// In-memory blob store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        validate_segment("bucket", bucket)?;
        validate_segment("key", key)?;
        let mut guard = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }
}

/// Filesystem blob store: one directory per bucket under `root`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_segment("bucket", bucket)?;
        validate_segment("key", key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

fn io_error(e: io::Error) -> StoreError {
    StoreError::unavailable(e.to_string())
}

impl BlobStore for LocalBlobStore {
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        fs::create_dir_all(self.root.join(bucket)).map_err(io_error)?;
        // Write-then-rename so readers never observe a half-written object.
        let tmp = self.root.join(bucket).join(format!(".{key}.partial"));
        fs::write(&tmp, bytes).map_err(io_error)?;
        fs::rename(&tmp, &path).map_err(io_error)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        validate_segment("bucket", bucket)?;
        let dir = self.root.join(bucket);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) && !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "docfleet-blob-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn in_memory_put_overwrites_and_lists_by_prefix() {
        let store = InMemoryBlobStore::new();
        store.put("b", "vs_r_0.json", b"one".to_vec()).unwrap();
        store.put("b", "vs_r_0.json", b"two".to_vec()).unwrap();
        store.put("b", "vs_r_1.json", b"x".to_vec()).unwrap();
        store.put("b", "r.txt", b"doc".to_vec()).unwrap();
        store.put("other", "vs_r_9.json", b"y".to_vec()).unwrap();

        assert_eq!(store.get("b", "vs_r_0.json").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.list("b", "vs_r_").unwrap(), vec!["vs_r_0.json", "vs_r_1.json"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let store = InMemoryBlobStore::new();
        assert!(matches!(
            store.put("b", "../escape", Vec::new()),
            Err(StoreError::InvalidKey(_))
        ));
        let local = LocalBlobStore::new(temp_root("reject"));
        assert!(matches!(local.get("..", "k"), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn local_store_round_trips_through_the_filesystem() {
        let root = temp_root("local");
        let store = LocalBlobStore::new(root.clone());

        assert_eq!(store.get("docfleet-r", "r.txt").unwrap(), None);
        assert!(store.list("docfleet-r", "").unwrap().is_empty());

        store.put("docfleet-r", "r.txt", b"hello".to_vec()).unwrap();
        store.put("docfleet-r", "vs_r_0.json", b"{}".to_vec()).unwrap();

        assert_eq!(store.get("docfleet-r", "r.txt").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.list("docfleet-r", "vs_").unwrap(), vec!["vs_r_0.json"]);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn request_bucket_is_derived_from_request_id() {
        let r = RequestId::new("handbook").unwrap();
        assert_eq!(request_bucket(&r), "docfleet-handbook");
    }
}
