//! File API Handlers
//!
//! HTTP handlers for screened uploads and the caller's stored files. By the
//! time these run the pipeline has authenticated the caller and, on the
//! upload route, attached the screened file.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, info};

use crate::{
    api::{app_state::AppState, dto::file_dto::*},
    error::AppError,
    security::{auth::AuthenticatedSubject, identity::ClientIdentity, pipeline::ScreenedUpload},
    storage::files::NewUpload,
};

/// Store a screened upload
///
/// POST /api/generate-boq
pub async fn generate_boq(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
    Extension(identity): Extension<ClientIdentity>,
    Extension(upload): Extension<ScreenedUpload>,
) -> Result<impl IntoResponse, AppError> {
    let categories = parse_categories(upload.categories.as_deref());
    debug!(
        "Storing upload {} ({} bytes) for {} with {} categories",
        upload.filename,
        upload.size,
        subject,
        categories.len()
    );

    let renamed = upload.filename != upload.original_filename;
    let record = state
        .files
        .store(NewUpload {
            owner: subject.0,
            client_identity: identity,
            filename: upload.filename,
            content: upload.content.to_vec(),
            categories,
        })
        .await?;

    info!(file_id = %record.id, owner = %record.owner, size = record.size, "upload stored");

    let mut response = FileResponse::from(record);
    if renamed {
        response.original_filename = Some(upload.original_filename);
    }

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the caller's files, newest first
///
/// GET /api/files
pub async fn list_files(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Listing files for: {}", subject);

    let records = state.files.list_by_owner(subject.as_str()).await?;

    Ok(Json(FileListResponse::from(records)))
}

/// Download one of the caller's files
///
/// GET /api/files/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Extension(subject): Extension<AuthenticatedSubject>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Downloading file {} for {}", id, subject);

    let record = state
        .files
        .list_by_owner(subject.as_str())
        .await?
        .into_iter()
        .find(|record| record.id == id)
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let content = state
        .files
        .content(&record.id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", record.filename))
            .map_err(|e| AppError::Internal(format!("invalid content disposition: {}", e)))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}
