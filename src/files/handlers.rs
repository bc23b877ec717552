use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{instrument, warn};

use super::services::{FileService, UploadResult, MAX_UPLOAD_BYTES};
use crate::{auth::jwt::AuthUser, error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/files/upload",
            // room for multipart framing around a maximum-size file
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route("/files/*key", delete(delete_file))
}

#[instrument(skip(state, files, mp))]
pub async fn upload_file(
    State(state): State<AppState>,
    State(files): State<FileService>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<Json<UploadResult>, AppError> {
    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        AppError::validation("file", "Malformed multipart body")
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let body = field.bytes().await.map_err(|e| {
            warn!(error = %e, "failed to read upload");
            AppError::validation("file", "File size too large. Maximum 10MB allowed")
        })?;
        let ctx = state.request_context();
        return files.upload(&ctx, &user, &file_name, body).await.map(Json);
    }
    Err(AppError::validation("file", "No file uploaded"))
}

#[instrument(skip(state, files))]
pub async fn delete_file(
    State(state): State<AppState>,
    State(files): State<FileService>,
    user: AuthUser,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let ctx = state.request_context();
    files.delete(&ctx, &user, &key).await?;
    Ok(Json(MessageResponse {
        message: "File deleted successfully".into(),
    }))
}
