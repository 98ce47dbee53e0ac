//! FileRepository — object-level operations over the blob and metadata
//! stores.
//!
//! The repository owns the consistency contract between the two stores. On
//! create the blob is written before the metadata record, so a crash between
//! the two writes leaves an invisible orphan blob rather than a metadata
//! record pointing at nothing; a read never 404s on a file the listing
//! advertises. Orphans are not swept automatically.
//!
//! Mutations on the same identifier (update, delete) are serialized through
//! a per-identifier async lock; operations on different identifiers
//! interleave freely. Reads are lock-free.

use crate::models::file::{SCHEMA_VERSION, StoredFile};
use crate::services::blob_store::BlobStore;
use crate::services::id_gen::IdGenerator;
use crate::services::metadata_store::MetadataStore;
use crate::services::{StoreError, StoreResult, sniff};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Default maximum payload size: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// One file in a batch upload request.
#[derive(Debug)]
pub struct UploadItem {
    pub original_name: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Per-item failure in a batch upload.
#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of a batch upload. Partial success is the normal shape, not an
/// error; callers must inspect `failed`.
#[derive(Debug)]
pub struct BatchOutcome {
    pub succeeded: Vec<StoredFile>,
    pub failed: Vec<BatchFailure>,
}

/// Decoded text content of a stored file.
#[derive(Debug, Serialize)]
pub struct FileContent {
    pub content: String,
    pub filename: String,
    pub size: i64,
}

/// Orchestrates [`BlobStore`] and [`MetadataStore`] into file-level
/// create/read/update/delete/list operations.
#[derive(Clone)]
pub struct FileRepository {
    blobs: BlobStore,
    meta: MetadataStore,
    ids: Arc<IdGenerator>,
    max_upload_bytes: usize,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FileRepository {
    pub fn new(blobs: BlobStore, meta: MetadataStore, max_upload_bytes: usize) -> Self {
        Self {
            blobs,
            meta,
            ids: Arc::new(IdGenerator::new()),
            max_upload_bytes,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.meta
    }

    /// Store a new file and its metadata record.
    pub async fn create(
        &self,
        original_name: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<StoredFile> {
        self.ensure_size(bytes.len())?;

        let id = self.ids.next();
        let stored_name = format!("{}_{}", id, sanitize_file_name(original_name));
        let location = self.blobs.put(&stored_name, &bytes).await?;

        let record = StoredFile {
            id,
            original_name: original_name.to_string(),
            stored_name,
            size_bytes: bytes.len() as i64,
            content_type,
            created_at: Utc::now(),
            updated_at: None,
            location: location.display().to_string(),
            schema_version: SCHEMA_VERSION,
        };

        if let Err(err) = self.meta.create(&record).await {
            // The blob landed but the record did not; remove the blob so the
            // failed create leaves nothing behind.
            if let Err(cleanup_err) = self.blobs.delete(&record.stored_name).await {
                debug!(
                    "could not remove blob `{}` after metadata failure: {}",
                    record.stored_name, cleanup_err
                );
            }
            return Err(err);
        }

        Ok(record)
    }

    /// Store a batch of files, each independently.
    ///
    /// A failed item never aborts the rest; it becomes an entry in
    /// `failed` naming the item's original filename.
    pub async fn create_many(&self, items: Vec<UploadItem>) -> BatchOutcome {
        let attempts = items.into_iter().map(|item| async move {
            let outcome = self
                .create(&item.original_name, item.bytes, item.content_type)
                .await;
            (item.original_name, outcome)
        });

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (filename, outcome) in futures::future::join_all(attempts).await {
            match outcome {
                Ok(record) => succeeded.push(record),
                Err(err) => failed.push(BatchFailure {
                    filename,
                    error: err.to_string(),
                }),
            }
        }
        BatchOutcome { succeeded, failed }
    }

    /// Fetch the metadata record for `id`.
    pub async fn read(&self, id: &str) -> StoreResult<StoredFile> {
        self.meta.get(id).await
    }

    /// Fetch a file's content decoded as UTF-8 text.
    ///
    /// Binary content is unsupported on this path; use [`Self::download`].
    pub async fn read_content(&self, id: &str) -> StoreResult<FileContent> {
        let record = self.meta.get(id).await?;
        let bytes = self.blobs.get(&record.stored_name).await?;
        let content = sniff::decode(&bytes)
            .ok_or(StoreError::NotDecodable)?
            .to_string();
        Ok(FileContent {
            content,
            filename: record.original_name,
            size: record.size_bytes,
        })
    }

    /// Fetch a file's raw bytes together with its metadata record.
    pub async fn download(&self, id: &str) -> StoreResult<(StoredFile, Bytes)> {
        let record = self.meta.get(id).await?;
        let bytes = self.blobs.get(&record.stored_name).await?;
        Ok((record, bytes))
    }

    /// All stored files, newest first.
    pub async fn list(&self) -> StoreResult<Vec<StoredFile>> {
        self.meta.list().await
    }

    /// Replace a file's content in place.
    ///
    /// Identifier, original name, stored name, and location are immutable
    /// across updates; only content and the fields derived from it change.
    pub async fn update(
        &self,
        id: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<StoredFile> {
        let _guard = self.lock_id(id).await;

        let record = self.meta.get(id).await?;
        self.ensure_size(bytes.len())?;
        self.blobs.put(&record.stored_name, &bytes).await?;
        self.meta
            .update_content(id, bytes.len() as i64, content_type, Utc::now())
            .await
    }

    /// Remove a file's blob and metadata record.
    ///
    /// A blob that is already gone does not fail the operation; metadata
    /// cleanup takes priority. Returns the deleted file's original name.
    pub async fn delete(&self, id: &str) -> StoreResult<String> {
        let _guard = self.lock_id(id).await;

        let record = self.meta.get(id).await?;
        match self.blobs.delete(&record.stored_name).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                debug!("blob `{}` already missing on delete", record.stored_name);
            }
            Err(err) => return Err(err),
        }
        self.meta.delete(id).await?;

        // Late arrivals for this identifier hit the NotFound check above, so
        // dropping the lock entry is safe.
        self.locks.lock().await.remove(id);

        Ok(record.original_name)
    }

    fn ensure_size(&self, size: usize) -> StoreResult<()> {
        if size > self.max_upload_bytes {
            return Err(StoreError::PayloadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Acquire the mutation lock for `id`, creating it on first use.
    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut table = self.locks.lock().await;
            table.entry(id.to_string()).or_default().clone()
        };
        cell.lock_owned().await
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Takes the final path segment, drops control characters, and falls back to
/// `file` when nothing usable remains.
fn sanitize_file_name(raw: &str) -> String {
    let tail = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = tail.chars().filter(|c| !c.is_control()).collect();
    match cleaned.as_str() {
        "" | "." | ".." => "file".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_LIMIT: usize = 1024;

    async fn repo() -> (FileRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path()).unwrap();
        let meta = MetadataStore::new(Arc::new(crate::test_support::memory_pool().await));
        (FileRepository::new(blobs, meta, TEST_LIMIT), dir)
    }

    #[tokio::test]
    async fn create_then_download_roundtrip() {
        let (repo, _dir) = repo().await;
        let payload = Bytes::from_static(b"\x00\x01binary payload\xFF");
        let record = repo
            .create("data.bin", payload.clone(), Some("application/octet-stream".into()))
            .await
            .unwrap();

        let (meta, bytes) = repo.download(&record.id).await.unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(meta.original_name, "data.bin");
        assert_eq!(meta.size_bytes, payload.len() as i64);
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let (repo, _dir) = repo().await;
        let record = repo
            .create("gone.txt", Bytes::from_static(b"bye"), None)
            .await
            .unwrap();

        let name = repo.delete(&record.id).await.unwrap();
        assert_eq!(name, "gone.txt");

        assert!(matches!(
            repo.read(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.download(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn size_boundary_is_exact() {
        let (repo, _dir) = repo().await;

        let at_limit = Bytes::from(vec![0u8; TEST_LIMIT]);
        assert!(repo.create("exact.bin", at_limit, None).await.is_ok());

        let over_limit = Bytes::from(vec![0u8; TEST_LIMIT + 1]);
        assert!(matches!(
            repo.create("over.bin", over_limit, None).await,
            Err(StoreError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (repo, _dir) = repo().await;
        let a = repo.create("a.txt", Bytes::from_static(b"a"), None).await.unwrap();
        let b = repo.create("b.txt", Bytes::from_static(b"b"), None).await.unwrap();
        let c = repo.create("c.txt", Bytes::from_static(b"c"), None).await.unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[tokio::test]
    async fn batch_captures_per_item_failures() {
        let (repo, _dir) = repo().await;
        let items = vec![
            UploadItem {
                original_name: "first.txt".into(),
                bytes: Bytes::from_static(b"ok"),
                content_type: None,
            },
            UploadItem {
                original_name: "too-big.bin".into(),
                bytes: Bytes::from(vec![0u8; TEST_LIMIT + 1]),
                content_type: None,
            },
            UploadItem {
                original_name: "third.txt".into(),
                bytes: Bytes::from_static(b"ok"),
                content_type: None,
            },
        ];

        let outcome = repo.create_many(items).await;
        assert_eq!(outcome.succeeded.len(), 2);
        let names: Vec<&str> = outcome
            .succeeded
            .iter()
            .map(|f| f.original_name.as_str())
            .collect();
        assert!(names.contains(&"first.txt") && names.contains(&"third.txt"));

        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].filename, "too-big.bin");
    }

    #[tokio::test]
    async fn batch_identifiers_are_distinct() {
        let (repo, _dir) = repo().await;
        let items = (0..8)
            .map(|i| UploadItem {
                original_name: format!("f{i}.txt"),
                bytes: Bytes::from_static(b"x"),
                content_type: None,
            })
            .collect();

        let outcome = repo.create_many(items).await;
        assert!(outcome.failed.is_empty());
        let mut ids: Vec<String> = outcome.succeeded.iter().map(|f| f.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn read_content_decodes_text_and_rejects_binary() {
        let (repo, _dir) = repo().await;

        let text = repo
            .create("hello.txt", Bytes::from_static(b"hello"), Some("text/plain".into()))
            .await
            .unwrap();
        let content = repo.read_content(&text.id).await.unwrap();
        assert_eq!(content.content, "hello");
        assert_eq!(content.filename, "hello.txt");
        assert_eq!(content.size, 5);

        let binary = repo
            .create("raw.bin", Bytes::from_static(&[0xFF]), None)
            .await
            .unwrap();
        assert!(matches!(
            repo.read_content(&binary.id).await,
            Err(StoreError::NotDecodable)
        ));
    }

    #[tokio::test]
    async fn update_preserves_identity() {
        let (repo, _dir) = repo().await;
        let created = repo
            .create("doc.txt", Bytes::from_static(b"v1"), Some("text/plain".into()))
            .await
            .unwrap();

        let updated = repo
            .update(
                &created.id,
                Bytes::from_static(b"version two"),
                Some("text/markdown".into()),
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.original_name, created.original_name);
        assert_eq!(updated.stored_name, created.stored_name);
        assert_eq!(updated.location, created.location);
        assert_eq!(updated.size_bytes, 11);
        assert_eq!(updated.content_type.as_deref(), Some("text/markdown"));
        assert!(updated.updated_at.is_some());

        let (_, bytes) = repo.download(&created.id).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"version two"));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let (repo, _dir) = repo().await;
        assert!(matches!(
            repo.update("absent", Bytes::from_static(b"x"), None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_names_cannot_escape_the_store() {
        let (repo, _dir) = repo().await;
        let record = repo
            .create("../../etc/passwd", Bytes::from_static(b"nope"), None)
            .await
            .unwrap();

        assert!(!record.stored_name.contains('/'));
        assert!(!record.stored_name.contains('\\'));
        assert!(record.stored_name.ends_with("_passwd"));

        let (_, bytes) = repo.download(&record.id).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"nope"));
    }

    #[tokio::test]
    async fn concurrent_update_and_delete_serialize() {
        let (repo, _dir) = repo().await;
        let record = repo
            .create("raced.txt", Bytes::from_static(b"v1"), None)
            .await
            .unwrap();

        let update_repo = repo.clone();
        let delete_repo = repo.clone();
        let id = record.id.clone();
        let id2 = record.id.clone();
        let (update_result, delete_result) = tokio::join!(
            tokio::spawn(async move {
                update_repo
                    .update(&id, Bytes::from_static(b"v2"), None)
                    .await
            }),
            tokio::spawn(async move { delete_repo.delete(&id2).await }),
        );
        let update_result = update_result.unwrap();
        let delete_result = delete_result.unwrap();

        // Whichever order the lock granted, the delete wins the end state.
        assert!(delete_result.is_ok());
        assert!(matches!(
            update_result,
            Ok(_) | Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.read(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.blobs().get(&record.stored_name).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn sanitize_strips_paths_and_control_characters() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("dir\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_file_name("a\nb\0c.txt"), "abc.txt");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("trailing/"), "file");
        assert_eq!(sanitize_file_name("notes..txt"), "notes..txt");
    }
}
