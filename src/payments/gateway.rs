use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::repo_types::{Amount, PurchaseStatus};
use crate::{
    config::PaymentConfig,
    context::{ContextError, RequestContext},
};

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("payment provider rejected the request: {0}")]
    Api(String),
    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct InitializePayment {
    pub amount: Amount,
    pub email: String,
    pub tx_ref: String,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
}

/// Provider-side view of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentVerification {
    pub status: String,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub tx_ref: Option<String>,
}

impl PaymentVerification {
    /// Local purchase status implied by the provider's verdict. Statuses the
    /// provider may still move on from map to `Pending`.
    pub fn outcome(&self) -> PurchaseStatus {
        match self.status.to_ascii_lowercase().as_str() {
            "success" => PurchaseStatus::Completed,
            "failed" | "cancelled" | "canceled" | "expired" | "reversed" => {
                PurchaseStatus::Failed
            }
            _ => PurchaseStatus::Pending,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a hosted checkout and returns its URL.
    async fn initialize(
        &self,
        ctx: &RequestContext,
        payment: InitializePayment,
    ) -> Result<String, GatewayError>;

    async fn verify(
        &self,
        ctx: &RequestContext,
        tx_ref: &str,
    ) -> Result<PaymentVerification, GatewayError>;
}

pub struct ChapaGateway {
    client: Client,
    base_url: Url,
    secret_key: String,
    currency: String,
}

#[derive(Serialize)]
struct InitializeBody<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    tx_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<&'a str>,
    description: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: Option<serde_json::Value>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct CheckoutData {
    checkout_url: String,
}

impl ChapaGateway {
    pub fn new(cfg: &PaymentConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(GATEWAY_TIMEOUT).build()?;
        let base = cfg.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            base_url: Url::parse(&format!("{base}/"))?,
            secret_key: cfg.secret_key.clone(),
            currency: cfg.currency.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Decode("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        let send = async {
            let response = request.bearer_auth(&self.secret_key).send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        let (status, body) = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason.into()),
            sent = send => sent?,
        };
        debug!(status = status.as_u16(), bytes = body.len(), "payment provider replied");
        decode_envelope(status, &body)
    }
}

fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, GatewayError> {
    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|e| {
        if status.is_success() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Api(format!("http status {status}"))
        }
    })?;
    if status != StatusCode::OK {
        let message = match envelope.message {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => format!("http status {status}"),
        };
        error!(%status, %message, "payment provider error");
        return Err(GatewayError::Api(message));
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::Decode("response has no data".into()))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[async_trait]
impl PaymentGateway for ChapaGateway {
    #[instrument(skip(self, ctx, payment), fields(tx_ref = %payment.tx_ref))]
    async fn initialize(
        &self,
        ctx: &RequestContext,
        payment: InitializePayment,
    ) -> Result<String, GatewayError> {
        let body = InitializeBody {
            amount: payment.amount.to_string(),
            currency: &self.currency,
            email: &payment.email,
            first_name: "Recipe",
            last_name: "User",
            tx_ref: &payment.tx_ref,
            callback_url: payment.callback_url.as_deref(),
            return_url: payment.return_url.as_deref(),
            description: "Recipe Purchase",
        };
        let url = self.endpoint(&["transaction", "initialize"])?;
        let data: CheckoutData = self.call(ctx, self.client.post(url).json(&body)).await?;
        Ok(data.checkout_url)
    }

    #[instrument(skip(self, ctx))]
    async fn verify(
        &self,
        ctx: &RequestContext,
        tx_ref: &str,
    ) -> Result<PaymentVerification, GatewayError> {
        let url = self.endpoint(&["transaction", "verify", tx_ref])?;
        self.call(ctx, self.client.get(url)).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode as HttpStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn gateway(base_url: String) -> ChapaGateway {
        ChapaGateway::new(&PaymentConfig {
            secret_key: "CHASECK-test".into(),
            base_url,
            currency: "ETB".into(),
        })
        .unwrap()
    }

    fn payment() -> InitializePayment {
        InitializePayment {
            amount: "25".parse().unwrap(),
            email: "alice@x.com".into(),
            tx_ref: "tx-123".into(),
            callback_url: None,
            return_url: Some("https://app.test/done".into()),
        }
    }

    #[tokio::test]
    async fn initialize_posts_formatted_amount_with_bearer_auth() {
        let app = Router::new().route(
            "/v1/transaction/initialize",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                assert_eq!(auth, "Bearer CHASECK-test");
                assert_eq!(body["amount"], "25.00");
                assert_eq!(body["currency"], "ETB");
                assert_eq!(body["tx_ref"], "tx-123");
                assert!(body.get("callback_url").is_none());
                Json(json!({
                    "message": "Hosted Link",
                    "status": "success",
                    "data": {"checkout_url": "https://checkout.chapa.co/pay/tx-123"}
                }))
            }),
        );
        let gw = gateway(spawn_server(app).await);
        let url = gw
            .initialize(&RequestContext::background(), payment())
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.chapa.co/pay/tx-123");
    }

    #[tokio::test]
    async fn non_200_becomes_api_error_with_provider_message() {
        let app = Router::new().route(
            "/v1/transaction/initialize",
            post(|| async {
                (
                    HttpStatus::BAD_REQUEST,
                    Json(json!({"message": "Invalid currency", "status": "failed", "data": null})),
                )
            }),
        );
        let gw = gateway(spawn_server(app).await);
        let err = gw
            .initialize(&RequestContext::background(), payment())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api(ref m) if m == "Invalid currency"));
    }

    #[tokio::test]
    async fn verify_reads_status_and_numeric_amount() {
        let app = Router::new().route(
            "/v1/transaction/verify/:tx_ref",
            get(|Path(tx_ref): Path<String>| async move {
                Json(json!({
                    "message": "Payment details",
                    "status": "success",
                    "data": {
                        "amount": 25,
                        "currency": "ETB",
                        "status": "success",
                        "reference": "APx1",
                        "tx_ref": tx_ref
                    }
                }))
            }),
        );
        let gw = gateway(spawn_server(app).await);
        let v = gw
            .verify(&RequestContext::background(), "tx-123")
            .await
            .unwrap();
        assert_eq!(v.outcome(), PurchaseStatus::Completed);
        assert_eq!(v.amount, "25");
        assert_eq!(v.tx_ref.as_deref(), Some("tx-123"));
    }

    #[test]
    fn only_final_verdicts_settle_a_purchase() {
        let verdict = |status: &str| PaymentVerification {
            status: status.into(),
            amount: "25.00".into(),
            currency: "ETB".into(),
            reference: None,
            tx_ref: None,
        };
        assert_eq!(verdict("success").outcome(), PurchaseStatus::Completed);
        assert_eq!(verdict("failed").outcome(), PurchaseStatus::Failed);
        assert_eq!(verdict("Cancelled").outcome(), PurchaseStatus::Failed);
        assert_eq!(verdict("pending").outcome(), PurchaseStatus::Pending);
        assert_eq!(verdict("").outcome(), PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn cancelled_context_skips_the_call() {
        let gw = gateway("http://127.0.0.1:9/v1".into());
        let ctx = RequestContext::background();
        ctx.cancel();
        let err = gw.verify(&ctx, "tx-1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Context(ContextError::Cancelled)));
    }
}
