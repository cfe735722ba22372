//! Blob storage seam.
//!
//! Master CSVs, uploaded output templates, and run deliverables all live
//! behind the `BlobStore` trait so the backing store can be swapped without
//! touching the mapping engine. The shipped implementation keeps blobs on
//! the local filesystem under a base directory.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use crate::error::{MappingError, Result};

pub type SharedStore = Arc<dyn BlobStore>;

pub trait BlobStore: Send + Sync {
    /// Read the blob at `path`. Fails with `NotFound` when it does not exist.
    fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `data` at `path`, replacing any existing blob. Returns the path
    /// the blob is reachable under.
    fn put(&self, path: &str, data: &[u8]) -> Result<String>;

    fn exists(&self, path: &str) -> bool;

    fn delete(&self, path: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at a base directory.
pub struct LocalBlobStore {
    base: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }
}

impl BlobStore for LocalBlobStore {
    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        match fs::read(&full) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MappingError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, path: &str, data: &[u8]) -> Result<String> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write through a temp file and rename so readers never observe a
        // half-written blob.
        let temp = full.with_extension("tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &full)?;

        debug!("stored blob {} ({} bytes)", path, data.len());
        Ok(path.to_string())
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path).exists()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MappingError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());

        store.put("master/a.csv", b"one").expect("put");
        assert_eq!(store.get("master/a.csv").expect("get"), b"one");

        store.put("master/a.csv", b"two").expect("overwrite");
        assert_eq!(store.get("master/a.csv").expect("get"), b"two");
        assert!(store.exists("master/a.csv"));
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());

        match store.get("master/missing.csv") {
            Err(MappingError::NotFound(path)) => assert_eq!(path, "master/missing.csv"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
        assert!(!store.exists("master/missing.csv"));
    }
}
