//! HTTP-facing error type.
//!
//! Every handler returns `Result<_, AppError>`. Remote-store detail is logged
//! here and replaced by a generic message before it reaches the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::graphql::QueryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0} is already taken")]
    Conflict(&'static str),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired authentication token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("remote store failure: {0}")]
    Remote(#[from] QueryError),

    #[error("{0}")]
    Persistence(String),

    #[error("payment provider failure: {0}")]
    Payment(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
            AppError::Remote(_)
            | AppError::Persistence(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Remote(_) | AppError::Persistence(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
            AppError::Payment(_) => "Payment provider request failed".to_string(),
            AppError::Storage(_) => "File storage request failed".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Remote(e) => tracing::error!(error = %e, "remote store error"),
            AppError::Persistence(msg) => tracing::error!(message = %msg, "persistence error"),
            AppError::Payment(msg) => tracing::error!(message = %msg, "payment gateway error"),
            AppError::Storage(msg) => tracing::error!(message = %msg, "storage error"),
            AppError::Internal(msg) => tracing::error!(message = %msg, "internal error"),
            AppError::InvalidCredentials => tracing::warn!("invalid login attempt"),
            AppError::Validation { field, message } => {
                tracing::debug!(field, message = %message, "validation failed")
            }
            other => tracing::debug!(error = %other, "request rejected"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = match &self {
            AppError::Validation { field, .. } => {
                json!({ "error": self.public_message(), "field": field })
            }
            _ => json!({ "error": self.public_message() }),
        };
        (status, Json(body)).into_response()
    }
}
