//! Durable metadata records in SQLite.
//!
//! One row per stored file, keyed by identifier. The store never mutates
//! rows on its own; the repository is the sole writer.

use crate::models::file::StoredFile;
use crate::services::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

const SELECT_COLUMNS: &str = "id, original_name, stored_name, size_bytes, content_type, \
     created_at, updated_at, location, schema_version";

/// SQLite-backed metadata store.
#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Persist a new record.
    ///
    /// Fails with `Conflict` when a record already exists at `record.id`;
    /// identifier collisions are surfaced, never silently overwritten.
    pub async fn create(&self, record: &StoredFile) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO files (id, original_name, stored_name, size_bytes, content_type,
                                created_at, updated_at, location, schema_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.original_name)
        .bind(&record.stored_name)
        .bind(record.size_bytes)
        .bind(&record.content_type)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.location)
        .bind(record.schema_version)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(record.id.clone())),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Fetch the record for `id`.
    pub async fn get(&self, id: &str) -> StoreResult<StoredFile> {
        sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {SELECT_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(id.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// All current records, newest first. Identifier order breaks ties
    /// within one timestamp granule.
    pub async fn list(&self) -> StoreResult<Vec<StoredFile>> {
        let rows = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {SELECT_COLUMNS} FROM files ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Apply a content update to the record for `id` and return it.
    ///
    /// Only the fields that change with the blob's content are touched;
    /// identifier, names, and location are immutable.
    pub async fn update_content(
        &self,
        id: &str,
        size_bytes: i64,
        content_type: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<StoredFile> {
        sqlx::query_as::<_, StoredFile>(&format!(
            "UPDATE files SET size_bytes = ?, content_type = ?, updated_at = ?
             WHERE id = ?
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(size_bytes)
        .bind(content_type)
        .bind(updated_at)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(id.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Remove the record for `id`.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Lightweight connectivity check for the readiness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::SCHEMA_VERSION;
    use chrono::Duration;

    async fn store() -> MetadataStore {
        MetadataStore::new(Arc::new(crate::test_support::memory_pool().await))
    }

    fn record(id: &str, created_at: DateTime<Utc>) -> StoredFile {
        StoredFile {
            id: id.to_string(),
            original_name: "notes.txt".to_string(),
            stored_name: format!("{id}_notes.txt"),
            size_bytes: 5,
            content_type: Some("text/plain".to_string()),
            created_at,
            updated_at: None,
            location: format!("data/blobs/aa/bb/{id}_notes.txt"),
            schema_version: SCHEMA_VERSION,
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = store().await;
        let rec = record("20260101_000000_000000_0000", Utc::now());
        store.create(&rec).await.unwrap();

        let fetched = store.get(&rec.id).await.unwrap();
        assert_eq!(fetched.original_name, rec.original_name);
        assert_eq!(fetched.stored_name, rec.stored_name);
        assert_eq!(fetched.size_bytes, rec.size_bytes);
        assert_eq!(fetched.schema_version, SCHEMA_VERSION);
        assert!(fetched.updated_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let store = store().await;
        let rec = record("dup", Utc::now());
        store.create(&rec).await.unwrap();
        assert!(matches!(
            store.create(&rec).await,
            Err(StoreError::Conflict(id)) if id == "dup"
        ));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = store().await;
        assert!(matches!(
            store.get("absent").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let store = store().await;
        let base = Utc::now();
        for (id, offset) in [("a", 0), ("b", 1), ("c", 2)] {
            store
                .create(&record(id, base + Duration::seconds(offset)))
                .await
                .unwrap();
        }

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn update_content_touches_only_derived_fields() {
        let store = store().await;
        let rec = record("upd", Utc::now());
        store.create(&rec).await.unwrap();

        let now = Utc::now();
        let updated = store
            .update_content(&rec.id, 99, Some("application/json".to_string()), now)
            .await
            .unwrap();

        assert_eq!(updated.size_bytes, 99);
        assert_eq!(updated.content_type.as_deref(), Some("application/json"));
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.original_name, rec.original_name);
        assert_eq!(updated.stored_name, rec.stored_name);
        assert_eq!(updated.location, rec.location);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = store().await;
        let rec = record("del", Utc::now());
        store.create(&rec).await.unwrap();
        store.delete(&rec.id).await.unwrap();

        assert!(matches!(
            store.get(&rec.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&rec.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
