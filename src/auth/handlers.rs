use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, TokenResponse},
        services::AuthService,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

#[instrument(skip(state, auth, payload))]
pub async fn register(
    State(state): State<AppState>,
    State(auth): State<AuthService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let ctx = state.request_context();
    let out = auth.register(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

#[instrument(skip(state, auth, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(auth): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let ctx = state.request_context();
    auth.login(&ctx, payload).await.map(Json)
}

/// Exchanges the token in `Authorization` for a fresh one.
#[instrument(skip(auth, headers))]
pub async fn refresh(
    State(auth): State<AuthService>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or(AppError::Unauthorized)?;
    let token = auth.refresh(raw)?;
    Ok(Json(TokenResponse { token }))
}
