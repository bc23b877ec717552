use std::time::Duration;

mod app;
mod auth;
mod config;
mod context;
mod error;
mod files;
mod graphql;
mod notifications;
mod payments;
mod state;
mod storage;

use crate::{
    config::AppConfig,
    context::RequestContext,
    graphql::{RemoteQuery, Variables, SCHEMA_PING},
    state::AppState,
};

const STARTUP_CHECK_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipehub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (app_state, email_worker) = AppState::init(config).await?;

    // Unreachable store is not fatal at startup; requests will report it.
    let check_ctx = RequestContext::with_timeout(STARTUP_CHECK_DEADLINE);
    match app_state
        .runner
        .execute(&check_ctx, RemoteQuery::new(SCHEMA_PING, Variables::new()))
        .await
    {
        Ok(_) => tracing::info!("graphql endpoint reachable"),
        Err(e) => tracing::warn!(error = %e, "graphql endpoint unreachable at startup; continuing"),
    }

    let app = app::build_app(app_state);
    app::serve(app).await?;

    if let Err(e) = email_worker.await {
        tracing::error!(error = %e, "email worker ended abnormally");
    }
    Ok(())
}
