//! Durable blob storage on local disk.
//!
//! Blobs live beneath `base_path/{shard}/{shard}/{key}` where the two shard
//! levels are the first two bytes of `md5(key)` in lowercase hex, bounding
//! the file count per directory. Writes go through a temp file that is
//! fsynced and renamed into place, so a blob at its final path is always
//! complete.

use crate::services::{StoreError, StoreResult};
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 255;

/// Disk-backed blob store keyed by stored name.
///
/// Keys are single path components; sanitization of user-supplied filenames
/// happens when the stored name is derived, this store only re-checks the
/// result before touching the filesystem.
#[derive(Clone, Debug)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at `base_path`, creating the directory if absent.
    pub fn new(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reject keys that could escape the store directory.
    ///
    /// A valid key is a non-empty single path component: no separators, no
    /// control characters, not `.` or `..`.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if key == "." || key == ".." {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if key
            .bytes()
            .any(|b| b == b'/' || b == b'\\' || b == b'\0' || b.is_ascii_control())
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Two-level shard identifiers for a key, from `md5(key)`.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Full path of the blob for `key`. Parent directories may not exist yet.
    pub fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Write `bytes` durably under `key`, overwriting any prior content.
    ///
    /// Returns the final on-disk path, recorded by callers as the blob's
    /// location.
    pub async fn put(&self, key: &str, bytes: &Bytes) -> StoreResult<PathBuf> {
        Self::ensure_key_safe(key)?;
        let blob_path = self.blob_path(key);
        let parent = blob_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = write_durably(&mut file, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &blob_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&blob_path).await?;
                fs::rename(&tmp_path, &blob_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        Ok(blob_path)
    }

    /// Read the blob stored under `key`.
    pub async fn get(&self, key: &str) -> StoreResult<Bytes> {
        Self::ensure_key_safe(key)?;
        match fs::read(self.blob_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Remove the blob stored under `key`, then prune empty shard directories.
    ///
    /// Fails with `NotFound` if there is nothing at `key`; callers decide
    /// whether a missing blob is tolerable.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;
        let blob_path = self.blob_path(key);
        match fs::remove_file(&blob_path).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = blob_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Recursively remove empty shard directories up to the store root.
    ///
    /// Stops at the root, at a non-empty directory, or on any unexpected
    /// I/O error.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn write_durably(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (store, _dir) = store();
        let body = Bytes::from_static(b"hello-world");
        let path = store.put("20260101_000000_000000_0000_a.txt", &body).await.unwrap();
        assert!(path.exists());

        let read = store.get("20260101_000000_000000_0000_a.txt").await.unwrap();
        assert_eq!(read, body);
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let (store, _dir) = store();
        store.put("k", &Bytes::from_static(b"one")).await.unwrap();
        store.put("k", &Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let (store, _dir) = store();
        assert!(matches!(
            store.get("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_blob_and_shard_dirs() {
        let (store, _dir) = store();
        let path = store.put("k", &Bytes::from_static(b"x")).await.unwrap();
        store.delete("k").await.unwrap();

        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
        assert!(store.base_path().exists());
        assert!(matches!(
            store.delete("k").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _dir) = store();
        for key in ["", ".", "..", "a/b", "a\\b", "a\0b", "..\\up"] {
            assert!(matches!(
                store.put(key, &Bytes::from_static(b"x")).await,
                Err(StoreError::InvalidKey(_))
            ));
        }
    }
}
