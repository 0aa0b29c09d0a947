//! Directory and file listing handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::{run_blocking, AppState};
use crate::config::Action;
use crate::storage::{normalize_directory, StoredFileInfo};
use crate::web::dto::{ApiResponse, DirectoryResponse, ListFilesQuery};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// GET /api/directories - Directories visible to the caller.
pub async fn list_directories(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Json<ApiResponse<Vec<DirectoryResponse>>> {
    let directories = state
        .permissions
        .accessible_directories(&claims.identity())
        .into_iter()
        .map(DirectoryResponse::from)
        .collect();
    Json(ApiResponse::new(directories))
}

/// GET /api/files?directory= - Completed files in a directory.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ApiResponse<Vec<StoredFileInfo>>>, ApiError> {
    let identity = claims.identity();
    let directory = normalize_directory(&query.directory)?;

    if !state
        .permissions
        .check_permission(&identity, &directory, Action::Read)?
    {
        return Err(ApiError::forbidden("Read permission denied"));
    }
    state.prepare_user_directory(&identity, &directory)?;

    let storage = Arc::clone(&state.storage);
    let files = run_blocking(move || storage.list_files(&directory)).await?;
    Ok(Json(ApiResponse::new(files)))
}
