//! Router configuration for the upload API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_upload, complete_upload, create_upload, get_upload_status, list_directories,
    list_files, list_uploads, upload_chunk, AppState,
};
use super::middleware::{create_cors_layer, jwt_auth, JwtState};

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, jwt_state: Arc<JwtState>) -> Router {
    let chunk_limit = usize::try_from(app_state.config.storage.max_chunk_size).unwrap_or(usize::MAX);
    let cors_origins = app_state.config.server.cors_origins.clone();

    let upload_routes = Router::new()
        .route("/uploads", post(create_upload))
        .route("/uploads/:id", get(get_upload_status).delete(cancel_upload))
        .route(
            "/uploads/:id/chunks/:index",
            put(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/uploads/:id/complete", post(complete_upload));

    let api_routes = Router::new()
        .merge(upload_routes)
        .route("/admin/uploads", get(list_uploads))
        .route("/directories", get(list_directories))
        .route("/files", get(list_files));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let state = jwt_state.clone();
                    jwt_auth(state, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
