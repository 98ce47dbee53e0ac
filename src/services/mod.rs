//! Storage core: identifier generation, blob storage, metadata storage, and
//! the repository that orchestrates them. Handlers call into [`repository`]
//! only; the leaf stores are wired together in `main`.

use std::io;
use thiserror::Error;

pub mod blob_store;
pub mod id_gen;
pub mod metadata_store;
pub mod repository;
pub mod sniff;

/// Errors surfaced by the storage core.
///
/// Store-level failures propagate through the repository unchanged so the
/// transport layer can distinguish a missing file from a full disk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("payload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("file `{0}` already exists")]
    Conflict(String),
    #[error("content is not valid UTF-8 text")]
    NotDecodable,
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
