use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Shortest signing secret accepted at startup.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlConfig {
    pub endpoint: String,
    pub admin_secret: String,
    pub admin_header: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Path-style endpoint (MinIO and friends). `None` means AWS proper.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub graphql: GraphqlConfig,
    pub jwt: JwtConfig,
    pub payments: PaymentConfig,
    pub storage: StorageConfig,
    pub request_timeout_secs: u64,
    pub notification_queue_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            graphql: GraphqlConfig {
                endpoint: var_any(&["GRAPHQL_ENDPOINT", "HASURA_ENDPOINT"])
                    .context("GRAPHQL_ENDPOINT is required")?,
                admin_secret: var_any(&["GRAPHQL_ADMIN_SECRET", "HASURA_ADMIN_SECRET"])
                    .context("GRAPHQL_ADMIN_SECRET is required")?,
                admin_header: var_or("GRAPHQL_ADMIN_HEADER", "x-hasura-admin-secret"),
                timeout_secs: parse_or("GRAPHQL_TIMEOUT_SECS", 30),
            },
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: var_or("JWT_ISSUER", "recipehub"),
                audience: var_or("JWT_AUDIENCE", "recipehub-users"),
                ttl_minutes: parse_or("JWT_TTL_MINUTES", 60 * 24),
            },
            payments: PaymentConfig {
                secret_key: var_or("CHAPA_SECRET_KEY", ""),
                base_url: var_or("CHAPA_BASE_URL", "https://api.chapa.co/v1"),
                currency: var_or("PAYMENT_CURRENCY", "ETB"),
            },
            storage: StorageConfig {
                region: var_or("AWS_REGION", "us-east-1"),
                access_key: var_or("AWS_ACCESS_KEY", ""),
                secret_key: var_or("AWS_SECRET_KEY", ""),
                bucket: var_or("S3_BUCKET", "recipe-images"),
                endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30),
            notification_queue_capacity: parse_or("NOTIFICATION_QUEUE_CAPACITY", 256),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the service cannot safely start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graphql.endpoint.trim().is_empty() {
            bail!("GRAPHQL_ENDPOINT must not be empty");
        }
        if self.graphql.admin_secret.is_empty() {
            bail!("GRAPHQL_ADMIN_SECRET must not be empty");
        }
        if self.jwt.secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long");
        }
        if self.jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if self.graphql.timeout_secs == 0 {
            bail!("GRAPHQL_TIMEOUT_SECS must be positive");
        }
        if self.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }
        if self.notification_queue_capacity == 0 {
            bail!("NOTIFICATION_QUEUE_CAPACITY must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn var_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        graphql: GraphqlConfig {
            endpoint: "http://127.0.0.1:1/v1/graphql".into(),
            admin_secret: "admin-secret".into(),
            admin_header: "x-hasura-admin-secret".into(),
            timeout_secs: 5,
        },
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        },
        payments: PaymentConfig {
            secret_key: "chapa-test".into(),
            base_url: "http://127.0.0.1:1".into(),
            currency: "ETB".into(),
        },
        storage: StorageConfig {
            region: "us-east-1".into(),
            access_key: "fake".into(),
            secret_key: "fake".into(),
            bucket: "recipe-images".into(),
            endpoint: None,
        },
        request_timeout_secs: 5,
        notification_queue_capacity: 8,
    }
}
