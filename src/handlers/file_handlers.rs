//! HTTP handlers for file operations. Extraction and response shaping only;
//! storage concerns live in `FileRepository`.

use crate::{
    errors::AppError,
    services::repository::{FileRepository, UploadItem},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST `/api/upload` — store a single file from a multipart form.
pub async fn upload_file(
    State(repo): State<FileRepository>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(item) = read_file_field(field).await? else {
            continue;
        };
        let record = repo
            .create(&item.original_name, item.bytes, item.content_type)
            .await?;
        return Ok(Json(json!({
            "success": true,
            "message": "File uploaded successfully",
            "data": record
        })));
    }
    Err(AppError::bad_request("request contained no file field"))
}

/// POST `/api/upload-multiple` — store several files from one multipart form.
///
/// Always answers 200; per-file failures are embedded in `errors`.
pub async fn upload_multiple(
    State(repo): State<FileRepository>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut items = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(item) = read_file_field(field).await? {
            items.push(item);
        }
    }

    let outcome = repo.create_many(items).await;
    Ok(Json(json!({
        "success": true,
        "message": format!("Uploaded {} file(s)", outcome.succeeded.len()),
        "data": outcome.succeeded,
        "errors": outcome.failed
    })))
}

/// GET `/api/files` — all stored files, newest first.
pub async fn list_files(
    State(repo): State<FileRepository>,
) -> Result<impl IntoResponse, AppError> {
    let files = repo.list().await?;
    Ok(Json(json!({
        "success": true,
        "count": files.len(),
        "data": files
    })))
}

/// GET `/api/files/{id}` — metadata for one file.
pub async fn get_file(
    State(repo): State<FileRepository>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = repo.read(&id).await?;
    Ok(Json(json!({ "success": true, "data": record })))
}

/// GET `/api/files/{id}/content` — file content decoded as UTF-8 text.
pub async fn get_file_content(
    State(repo): State<FileRepository>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let content = repo.read_content(&id).await?;
    Ok(Json(json!({ "success": true, "data": content })))
}

/// GET `/api/download/{id}` — raw bytes with download headers.
pub async fn download_file(
    State(repo): State<FileRepository>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (record, bytes) = repo.download(&id).await?;

    let content_type = record
        .content_type
        .unwrap_or_else(|| "application/octet-stream".into());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.original_name.replace('"', "'")
    );

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&record.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    Ok(response)
}

/// PUT `/api/files/{id}` — replace a file's content.
pub async fn update_file(
    State(repo): State<FileRepository>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(item) = read_file_field(field).await? else {
            continue;
        };
        let record = repo.update(&id, item.bytes, item.content_type).await?;
        return Ok(Json(json!({
            "success": true,
            "message": "File updated successfully",
            "data": record
        })));
    }
    Err(AppError::bad_request("request contained no file field"))
}

/// DELETE `/api/files/{id}` — remove a file and its metadata.
pub async fn delete_file(
    State(repo): State<FileRepository>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let original_name = repo.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File '{}' deleted successfully", original_name)
    })))
}

/// Read one multipart field into an upload item.
///
/// Fields without a filename (plain form values) are skipped.
async fn read_file_field(field: Field<'_>) -> Result<Option<UploadItem>, AppError> {
    let Some(original_name) = field.file_name().map(str::to_string) else {
        return Ok(None);
    };
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(multipart_error)?;
    Ok(Some(UploadItem {
        original_name,
        bytes,
        content_type,
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
