//! Defines routes for all file storage operations.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /api/upload` — upload a single file
//!   - `POST   /api/upload-multiple` — upload several files, per-item errors
//!   - `GET    /api/files` — list all files, newest first
//!   - `GET    /api/files/{id}` — metadata for one file
//!   - `GET    /api/files/{id}/content` — content decoded as UTF-8 text
//!   - `GET    /api/download/{id}` — raw bytes with download headers
//!   - `PUT    /api/files/{id}` — replace a file's content
//!   - `DELETE /api/files/{id}` — delete a file and its metadata
//!
//! Health endpoints (`/healthz`, `/readyz`) are mounted at the root.

use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_file, get_file, get_file_content, list_files, update_file,
            upload_file, upload_multiple,
        },
        health_handlers::{healthz, readyz},
    },
    services::repository::FileRepository,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all file storage routes.
///
/// The router carries shared state (`FileRepository`) to all handlers.
pub fn routes() -> Router<FileRepository> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file endpoints
        .route("/api/upload", post(upload_file))
        .route("/api/upload-multiple", post(upload_multiple))
        .route("/api/files", get(list_files))
        .route(
            "/api/files/{id}",
            get(get_file).put(update_file).delete(delete_file),
        )
        .route("/api/files/{id}/content", get(get_file_content))
        .route("/api/download/{id}", get(download_file))
}
