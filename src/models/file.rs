//! Represents a stored file — a blob on disk plus its metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Version tag written into every new metadata record so future field
/// additions can be told apart from old rows.
pub const SCHEMA_VERSION: i64 = 1;

/// Metadata record for a single stored file.
///
/// The record describes the blob, it does not contain the blob's bytes.
/// `id` is the externally addressable handle and the join key between the
/// metadata table and the blob on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredFile {
    /// Time-sortable identifier assigned at creation, immutable, never reused.
    pub id: String,

    /// Filename as supplied by the client. May contain arbitrary characters
    /// including path separators; never used directly as a storage key.
    pub original_name: String,

    /// Sanitized on-disk key, derived from `id` + `original_name`.
    pub stored_name: String,

    /// Byte length of the blob at last write.
    pub size_bytes: i64,

    /// Client-declared MIME type. Untrusted, echoed back on download.
    pub content_type: Option<String>,

    /// When the file was uploaded.
    pub created_at: DateTime<Utc>,

    /// Set on content update, absent until then.
    pub updated_at: Option<DateTime<Utc>>,

    /// Opaque storage-layer locator of the blob (relative disk path).
    pub location: String,

    /// Record-format version, see [`SCHEMA_VERSION`].
    pub schema_version: i64,
}
