//! Core data models for the file storage service.
//!
//! These entities map to database rows via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod file;
