//! Chunked upload handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::{run_blocking, AppState};
use crate::config::Action;
use crate::storage::normalize_directory;
use crate::upload::{SavedFile, UploadSession, UploadStatus};
use crate::web::dto::{
    ApiResponse, CancelResponse, ChunkResponse, CreateUploadRequest, CreateUploadResponse,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::{AuthUser, JwtClaims};

/// A live upload as seen by an administrator.
#[derive(Debug, Serialize)]
pub struct AdminUploadResponse {
    pub owner_id: String,
    #[serde(flatten)]
    pub status: UploadStatus,
}

fn ensure_enabled(state: &AppState) -> Result<(), ApiError> {
    if state.config.storage.chunk_upload_enabled {
        Ok(())
    } else {
        Err(ApiError::not_found("Chunked uploads are disabled"))
    }
}

/// Load a session the caller is allowed to act on.
async fn owned_session(
    state: &AppState,
    claims: &JwtClaims,
    upload_id: &str,
) -> Result<UploadSession, ApiError> {
    let uploads = Arc::clone(&state.uploads);
    let id = upload_id.to_string();
    let session = run_blocking(move || uploads.get(&id)).await?;

    let identity = claims.identity();
    if session.owner_id != identity.user_id && !state.permissions.is_admin(&identity) {
        tracing::warn!(
            upload_id = %upload_id,
            owner = %session.owner_id,
            user_id = %identity.user_id,
            "Rejected access to another user's upload"
        );
        return Err(ApiError::forbidden("Not the owner of this upload"));
    }
    Ok(session)
}

/// POST /api/uploads - Start a chunked upload.
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUploadRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateUploadResponse>>), ApiError> {
    ensure_enabled(&state)?;
    let identity = claims.identity();
    let directory = normalize_directory(&req.directory)?;

    if !state
        .permissions
        .check_permission(&identity, &directory, Action::Write)?
    {
        return Err(ApiError::forbidden("Write permission denied"));
    }
    state.prepare_user_directory(&identity, &directory)?;

    let chunk_size = req
        .chunk_size
        .unwrap_or(state.uploads.settings().default_chunk_size);
    let uploads = Arc::clone(&state.uploads);
    let owner = identity.user_id;
    let session = run_blocking(move || {
        uploads.create(&owner, &req.filename, &directory, req.file_size, chunk_size)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(CreateUploadResponse::from(&session))),
    ))
}

/// PUT /api/uploads/:id/chunks/:index - Store one chunk (raw body).
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path((upload_id, chunk_index)): Path<(String, u32)>,
    body: Bytes,
) -> Result<Json<ApiResponse<ChunkResponse>>, ApiError> {
    ensure_enabled(&state)?;
    owned_session(&state, &claims, &upload_id).await?;

    let uploads = Arc::clone(&state.uploads);
    run_blocking(move || uploads.save_chunk(&upload_id, chunk_index, &body)).await?;

    Ok(Json(ApiResponse::new(ChunkResponse { chunk_index })))
}

/// GET /api/uploads/:id - Upload progress.
pub async fn get_upload_status(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(upload_id): Path<String>,
) -> Result<Json<ApiResponse<UploadStatus>>, ApiError> {
    ensure_enabled(&state)?;
    let session = owned_session(&state, &claims, &upload_id).await?;
    Ok(Json(ApiResponse::new(session.status())))
}

/// POST /api/uploads/:id/complete - Assemble the final file.
pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(upload_id): Path<String>,
) -> Result<Json<ApiResponse<SavedFile>>, ApiError> {
    ensure_enabled(&state)?;
    owned_session(&state, &claims, &upload_id).await?;

    let uploads = Arc::clone(&state.uploads);
    let saved = run_blocking(move || uploads.complete(&upload_id)).await?;
    Ok(Json(ApiResponse::new(saved)))
}

/// DELETE /api/uploads/:id - Cancel an upload.
pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(upload_id): Path<String>,
) -> Result<Json<ApiResponse<CancelResponse>>, ApiError> {
    ensure_enabled(&state)?;
    owned_session(&state, &claims, &upload_id).await?;

    let uploads = Arc::clone(&state.uploads);
    run_blocking(move || uploads.cancel(&upload_id)).await?;
    Ok(Json(ApiResponse::new(CancelResponse { cancelled: true })))
}

/// GET /api/admin/uploads - All live uploads (admin only).
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<Vec<AdminUploadResponse>>>, ApiError> {
    if !state.permissions.is_admin(&claims.identity()) {
        return Err(ApiError::forbidden("Admin role required"));
    }

    let uploads = Arc::clone(&state.uploads);
    let sessions = run_blocking(move || Ok::<_, ApiError>(uploads.list_all())).await?;
    let data = sessions
        .iter()
        .map(|s| AdminUploadResponse {
            owner_id: s.owner_id.clone(),
            status: s.status(),
        })
        .collect();
    Ok(Json(ApiResponse::new(data)))
}
