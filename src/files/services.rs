use std::{future::Future, path::Path, sync::Arc};

use axum::extract::FromRef;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser, context::RequestContext, error::AppError, state::AppState,
    storage::StorageClient,
};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResult {
    pub url: String,
    pub key: String,
    pub file_name: String,
    pub size: usize,
}

/// Lowercased extension of an allowed image file name.
pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `{owner}/{uuid}_{unix_ts}.{ext}`
pub fn object_key(owner: Uuid, ext: &str) -> String {
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    format!("{owner}/{}_{ts}.{ext}", Uuid::new_v4())
}

/// True when `key` lives under the owner's prefix and cannot escape it.
pub fn owns_key(owner: Uuid, key: &str) -> bool {
    let prefix = format!("{owner}/");
    key.strip_prefix(&prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.split('/').any(|s| s.is_empty() || s == ".."))
}

async fn within<T>(
    ctx: &RequestContext,
    op: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, AppError> {
    if let Some(reason) = ctx.err() {
        return Err(AppError::Storage(reason.to_string()));
    }
    tokio::select! {
        biased;
        reason = ctx.done() => Err(AppError::Storage(reason.to_string())),
        out = op => out.map_err(|e| AppError::Storage(format!("{e:#}"))),
    }
}

#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn StorageClient>,
}

impl FromRef<AppState> for FileService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.storage.clone())
    }
}

impl FileService {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, ctx, body), fields(user_id = %user.id, size = body.len()))]
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        file_name: &str,
        body: Bytes,
    ) -> Result<UploadResult, AppError> {
        let ext = image_extension(file_name).ok_or_else(|| {
            AppError::validation("file", "Invalid file type. Only images are allowed")
        })?;
        if body.is_empty() {
            return Err(AppError::validation("file", "File is empty"));
        }
        if body.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::validation(
                "file",
                "File size too large. Maximum 10MB allowed",
            ));
        }

        let key = object_key(user.id, &ext);
        let size = body.len();
        within(ctx, self.storage.put_object(&key, body, content_type_for(&ext))).await?;
        info!(%key, "file uploaded");

        Ok(UploadResult {
            url: self.storage.public_url(&key),
            key,
            file_name: file_name.to_string(),
            size,
        })
    }

    #[instrument(skip(self, ctx), fields(user_id = %user.id))]
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        key: &str,
    ) -> Result<(), AppError> {
        let key = key.trim_start_matches('/');
        if !owns_key(user.id, key) {
            warn!(%key, "delete outside caller's prefix");
            return Err(AppError::Forbidden(
                "You can only delete your own files".into(),
            ));
        }
        within(ctx, self.storage.delete_object(key)).await?;
        info!(%key, "file deleted");
        Ok(())
    }
}
