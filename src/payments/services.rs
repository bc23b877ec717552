use std::sync::Arc;

use axum::extract::FromRef;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        InitializePaymentRequest, InitializePaymentResponse, PaymentStatusResponse,
        VerifyPaymentResponse,
    },
    gateway::{GatewayError, InitializePayment, PaymentGateway},
    repo::{PurchaseRepoError, PurchaseRepository},
    repo_types::{Amount, NewPurchase, PurchaseRecord, PurchaseStatus},
};
use crate::{auth::jwt::AuthUser, context::RequestContext, error::AppError, state::AppState};

const MAX_TX_REF_LEN: usize = 100;

fn repo_error(e: PurchaseRepoError) -> AppError {
    match e {
        PurchaseRepoError::Query(q) => AppError::Remote(q),
        PurchaseRepoError::Creation => {
            AppError::Persistence("purchase creation returned no record".into())
        }
    }
}

fn gateway_error(e: GatewayError) -> AppError {
    AppError::Payment(e.to_string())
}

fn parse_amount(raw: &serde_json::Value) -> Result<Amount, AppError> {
    if raw.is_null() {
        return Err(AppError::validation("amount", "Amount is required"));
    }
    Amount::deserialize(raw).map_err(|e| AppError::validation("amount", e.to_string()))
}

fn check_url(field: &'static str, url: Option<String>) -> Result<Option<String>, AppError> {
    match url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        None => Ok(None),
        Some(u) => match Url::parse(&u) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(u)),
            _ => Err(AppError::validation(field, "Must be an http(s) URL")),
        },
    }
}

/// Transaction references are ours (UUIDs) but arrive from the client.
pub fn validate_tx_ref(raw: &str) -> Result<&str, AppError> {
    let tx_ref = raw.trim();
    let well_formed = !tx_ref.is_empty()
        && tx_ref.len() <= MAX_TX_REF_LEN
        && tx_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed {
        return Err(AppError::validation(
            "tx_ref",
            "Transaction reference required",
        ));
    }
    Ok(tx_ref)
}

#[derive(Clone)]
pub struct PaymentService {
    purchases: Arc<dyn PurchaseRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl FromRef<AppState> for PaymentService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.purchases.clone(), state.payments.clone())
    }
}

impl PaymentService {
    pub fn new(purchases: Arc<dyn PurchaseRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { purchases, gateway }
    }

    /// The caller may only look at purchases they made.
    async fn owned_purchase(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        tx_ref: &str,
    ) -> Result<Option<PurchaseRecord>, AppError> {
        let purchase = self
            .purchases
            .get_purchase_by_transaction(ctx, tx_ref)
            .await
            .map_err(repo_error)?;
        match purchase {
            Some(p) if p.user_id != user.id => {
                warn!(owner = %p.user_id, "transaction belongs to another user");
                Err(AppError::Forbidden(
                    "You do not have access to this transaction".into(),
                ))
            }
            other => Ok(other),
        }
    }

    #[instrument(skip(self, ctx, req), fields(user_id = %user.id))]
    pub async fn initialize(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        req: InitializePaymentRequest,
    ) -> Result<InitializePaymentResponse, AppError> {
        let recipe_id = req.recipe_id.trim().to_string();
        if recipe_id.is_empty() {
            return Err(AppError::validation("recipe_id", "Recipe ID is required"));
        }
        let amount = parse_amount(&req.amount)?;
        let callback_url = check_url("callback_url", req.callback_url)?;
        let return_url = check_url("return_url", req.return_url)?;

        let tx_ref = Uuid::new_v4().to_string();
        let checkout_url = self
            .gateway
            .initialize(
                ctx,
                InitializePayment {
                    amount,
                    email: user.email.clone(),
                    tx_ref: tx_ref.clone(),
                    callback_url,
                    return_url,
                },
            )
            .await
            .map_err(gateway_error)?;

        self.purchases
            .create_purchase(
                ctx,
                NewPurchase {
                    user_id: user.id,
                    recipe_id,
                    amount,
                    transaction_id: tx_ref.clone(),
                },
            )
            .await
            .map_err(repo_error)?;

        info!(tx_ref = %tx_ref, %amount, "payment initialized");
        Ok(InitializePaymentResponse {
            checkout_url,
            transaction_id: tx_ref,
        })
    }

    /// Settles a pending purchase from the provider's final verdict. A
    /// non-final verdict leaves it pending; a purchase already settled keeps
    /// its status and that status is reported. Unknown transactions are
    /// `NotFound`.
    #[instrument(skip(self, ctx), fields(user_id = %user.id))]
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        tx_ref: &str,
    ) -> Result<VerifyPaymentResponse, AppError> {
        let tx_ref = validate_tx_ref(tx_ref)?;
        let existing = self
            .owned_purchase(ctx, user, tx_ref)
            .await?
            .ok_or(AppError::NotFound("purchase"))?;

        let verification = self
            .gateway
            .verify(ctx, tx_ref)
            .await
            .map_err(gateway_error)?;
        let target = verification.outcome();
        let changed = if target.is_terminal() {
            self.purchases
                .update_purchase_status(ctx, tx_ref, target)
                .await
                .map_err(repo_error)?
        } else {
            debug!(tx_ref, provider_status = %verification.status, "payment not final yet");
            0
        };
        let purchase_status = if changed > 0 {
            info!(tx_ref, status = target.as_str(), "purchase settled");
            target
        } else {
            existing.status
        };

        Ok(VerifyPaymentResponse {
            status: verification.status,
            transaction_id: tx_ref.to_string(),
            amount: verification.amount,
            purchase_status,
        })
    }

    #[instrument(skip(self, ctx), fields(user_id = %user.id))]
    pub async fn status(
        &self,
        ctx: &RequestContext,
        user: &AuthUser,
        tx_ref: &str,
    ) -> Result<PaymentStatusResponse, AppError> {
        let tx_ref = validate_tx_ref(tx_ref)?;
        let purchase = self.owned_purchase(ctx, user, tx_ref).await?;
        let provider = self
            .gateway
            .verify(ctx, tx_ref)
            .await
            .map_err(gateway_error)?;
        Ok(PaymentStatusResponse {
            provider,
            purchase_status: purchase.map(|p| p.status),
        })
    }
}
