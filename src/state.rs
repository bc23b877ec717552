use std::sync::Arc;

use axum::extract::FromRef;
use tokio::task::JoinHandle;

use crate::{
    auth::{
        jwt::TokenService,
        repo::{GraphqlUserRepository, UserRepository},
    },
    config::AppConfig,
    context::RequestContext,
    graphql::{HttpQueryExecutor, QueryRunner},
    notifications::{
        repo::{GraphqlNotificationRepository, NotificationRepository},
        worker::{LogMailer, Notifier},
    },
    payments::{
        gateway::{ChapaGateway, PaymentGateway},
        repo::{GraphqlPurchaseRepository, PurchaseRepository},
    },
    storage::{Storage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runner: Arc<dyn QueryRunner>,
    pub users: Arc<dyn UserRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub storage: Arc<dyn StorageClient>,
    pub payments: Arc<dyn PaymentGateway>,
    pub tokens: TokenService,
    pub notifier: Notifier,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl AppState {
    /// Builds every collaborator from configuration and starts the email
    /// worker. The returned handle finishes once all notifiers are dropped.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let config = Arc::new(config);

        let runner = Arc::new(HttpQueryExecutor::new(&config.graphql)?) as Arc<dyn QueryRunner>;
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let payments = Arc::new(ChapaGateway::new(&config.payments)?) as Arc<dyn PaymentGateway>;
        let (notifier, worker) =
            Notifier::spawn(Arc::new(LogMailer), config.notification_queue_capacity);

        let state = Self {
            users: Arc::new(GraphqlUserRepository::new(runner.clone())),
            purchases: Arc::new(GraphqlPurchaseRepository::new(runner.clone())),
            notifications: Arc::new(GraphqlNotificationRepository::new(runner.clone())),
            tokens: TokenService::new(&config.jwt),
            runner,
            storage,
            payments,
            notifier,
            config,
        };
        Ok((state, worker))
    }

    /// Fresh per-request context bounded by the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.config.request_timeout())
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::{
            auth::services::testing::MemoryUsers,
            config::test_config,
            graphql::testing::ScriptedRunner,
            payments::{gateway::testing::FakeGateway, repo::testing::MemoryPurchases},
            storage::testing::MemoryStorage,
        };
        use serde_json::json;

        let config = Arc::new(test_config());
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(json!({"insert_email_notifications_one": {"id": uuid::Uuid::new_v4()}}))
        })) as Arc<dyn QueryRunner>;
        let (notifier, _worker) = Notifier::spawn(Arc::new(LogMailer), 8);

        Self {
            users: Arc::new(MemoryUsers::default()),
            purchases: Arc::new(MemoryPurchases::default()),
            notifications: Arc::new(GraphqlNotificationRepository::new(runner.clone())),
            storage: Arc::new(MemoryStorage::default()),
            payments: Arc::new(FakeGateway::default()),
            tokens: TokenService::new(&config.jwt),
            runner,
            notifier,
            config,
        }
    }
}
