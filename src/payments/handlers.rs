use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        InitializePaymentRequest, InitializePaymentResponse, PaymentStatusResponse,
        VerifyPaymentResponse, VerifyQuery,
    },
    services::PaymentService,
};
use crate::{auth::jwt::AuthUser, error::AppError, state::AppState};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/initialize", post(initialize_payment))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/status/:transaction_id", get(payment_status))
}

#[instrument(skip(state, payments, payload))]
pub async fn initialize_payment(
    State(state): State<AppState>,
    State(payments): State<PaymentService>,
    user: AuthUser,
    Json(payload): Json<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, AppError> {
    let ctx = state.request_context();
    payments.initialize(&ctx, &user, payload).await.map(Json)
}

#[instrument(skip(state, payments))]
pub async fn verify_payment(
    State(state): State<AppState>,
    State(payments): State<PaymentService>,
    user: AuthUser,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let ctx = state.request_context();
    let tx_ref = query.tx_ref.unwrap_or_default();
    payments.verify(&ctx, &user, &tx_ref).await.map(Json)
}

#[instrument(skip(state, payments))]
pub async fn payment_status(
    State(state): State<AppState>,
    State(payments): State<PaymentService>,
    user: AuthUser,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let ctx = state.request_context();
    payments.status(&ctx, &user, &transaction_id).await.map(Json)
}
