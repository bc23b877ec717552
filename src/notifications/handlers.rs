use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{
    repo::QueuedEmail,
    templates::{self, EmailMessage},
};
use crate::{
    auth::{jwt::AuthUser, services::is_valid_email},
    error::AppError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct EmailNotificationRequest {
    pub recipient_email: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn notification_routes() -> Router<AppState> {
    Router::new().route("/notifications/email", post(send_email_notification))
}

#[instrument(skip(state, payload), fields(user_id = %user.id, kind = %payload.kind))]
pub async fn send_email_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<EmailNotificationRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let recipient = payload.recipient_email.trim().to_lowercase();
    if !is_valid_email(&recipient) {
        return Err(AppError::validation(
            "recipient_email",
            "Please provide a valid email address",
        ));
    }

    let (subject, body) = templates::render(&payload.kind, &payload.data)
        .map_err(|e| AppError::validation("type", e.to_string()))?;

    let ctx = state.request_context();
    state
        .notifications
        .queue_email(
            &ctx,
            QueuedEmail {
                recipient_email: recipient.clone(),
                subject: subject.clone(),
                body: body.clone(),
                template_type: payload.kind,
                template_data: payload.data,
            },
        )
        .await?;

    state.notifier.dispatch(EmailMessage {
        to: recipient,
        subject,
        body,
    });
    info!("email notification queued");

    Ok(Json(MessageResponse {
        message: "Email notification queued".into(),
    }))
}
