use serde::{Deserialize, Serialize};

use super::{gateway::PaymentVerification, repo_types::PurchaseStatus};

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    #[serde(default)]
    pub recipe_id: String,
    /// Number or decimal string; validated into an `Amount`.
    #[serde(default)]
    pub amount: serde_json::Value,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitializePaymentResponse {
    pub checkout_url: String,
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub tx_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    /// Status as reported by the payment provider.
    pub status: String,
    pub transaction_id: String,
    pub amount: String,
    pub purchase_status: PurchaseStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    #[serde(flatten)]
    pub provider: PaymentVerification,
    pub purchase_status: Option<PurchaseStatus>,
}
