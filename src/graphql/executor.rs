//! Reqwest-backed GraphQL executor.
//!
//! Sends `{query, variables}` to one endpoint with the admin secret header and
//! classifies the outcome as transport, decode, or remote failure. It knows
//! nothing about the operation it runs and never retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderName, Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::value::Variables;
use crate::{
    config::GraphqlConfig,
    context::{ContextError, RequestContext},
};

/// Query text plus variables; built per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,
}

impl RemoteQuery {
    pub fn new(query: impl Into<String>, variables: Variables) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// A successful remote result: the `data` member of the response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResult {
    pub data: serde_json::Value,
}

impl RemoteResult {
    /// Decodes `data` into the operation's result shape.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, QueryError> {
        serde_json::from_value(self.data).map_err(|e| QueryError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("remote error: {message}")]
    Remote {
        message: String,
        code: Option<String>,
    },
}

impl QueryError {
    /// True when the store rejected a write because of a uniqueness constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            QueryError::Remote { message, code } => {
                code.as_deref() == Some("constraint-violation")
                    || message.contains("Uniqueness violation")
            }
            _ => false,
        }
    }
}

impl From<ContextError> for QueryError {
    fn from(e: ContextError) -> Self {
        QueryError::Transport(TransportError::Context(e))
    }
}

/// Runs one remote query. Repositories depend on this, not on HTTP.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn execute(
        &self,
        ctx: &RequestContext,
        query: RemoteQuery,
    ) -> Result<RemoteResult, QueryError>;
}

pub struct HttpQueryExecutor {
    client: Client,
    endpoint: Url,
    admin_header: HeaderName,
    admin_secret: String,
}

impl HttpQueryExecutor {
    pub fn new(cfg: &GraphqlConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: Url::parse(&cfg.endpoint)?,
            admin_header: HeaderName::from_bytes(cfg.admin_header.as_bytes())?,
            admin_secret: cfg.admin_secret.clone(),
        })
    }

    async fn send(&self, query: &RemoteQuery) -> Result<(u16, bytes::Bytes), reqwest::Error> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(&self.admin_header, self.admin_secret.as_str())
            .json(query)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl QueryRunner for HttpQueryExecutor {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn execute(
        &self,
        ctx: &RequestContext,
        query: RemoteQuery,
    ) -> Result<RemoteResult, QueryError> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let (status, body) = tokio::select! {
            biased;
            reason = ctx.done() => {
                debug!(%reason, "graphql request aborted");
                return Err(reason.into());
            }
            sent = self.send(&query) => sent.map_err(|e| {
                error!(error = %e, "graphql transport failure");
                QueryError::Transport(TransportError::Http(e))
            })?,
        };
        debug!(status, bytes = body.len(), "graphql response received");

        parse_response(&body)
    }
}

fn parse_response(body: &[u8]) -> Result<RemoteResult, QueryError> {
    let decoded: GraphqlResponse = serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, "graphql response is not valid JSON");
        QueryError::Decode(e.to_string())
    })?;

    if let Some(first) = decoded.errors.into_iter().next() {
        error!(message = %first.message, "graphql returned errors");
        return Err(QueryError::Remote {
            message: first.message,
            code: first.extensions.and_then(|x| x.code),
        });
    }

    match decoded.data {
        Some(data) if !data.is_null() => Ok(RemoteResult { data }),
        _ => Err(QueryError::Decode(
            "response carried neither data nor errors".into(),
        )),
    }
}
