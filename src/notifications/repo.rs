use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    context::RequestContext,
    graphql::{QueryError, QueryRunner, RemoteQuery, Variables},
};

/// Email record persisted before delivery is attempted.
#[derive(Debug, Clone)]
pub struct QueuedEmail {
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub template_type: String,
    pub template_data: serde_json::Value,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Stores the email with status `pending` and returns its id.
    async fn queue_email(
        &self,
        ctx: &RequestContext,
        email: QueuedEmail,
    ) -> Result<Option<Uuid>, QueryError>;
}

pub struct GraphqlNotificationRepository {
    runner: Arc<dyn QueryRunner>,
}

impl GraphqlNotificationRepository {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NotificationRepository for GraphqlNotificationRepository {
    #[instrument(skip(self, ctx, email), fields(template = %email.template_type))]
    async fn queue_email(
        &self,
        ctx: &RequestContext,
        email: QueuedEmail,
    ) -> Result<Option<Uuid>, QueryError> {
        #[derive(Deserialize)]
        struct Row {
            id: Uuid,
        }
        #[derive(Deserialize)]
        struct Inserted {
            insert_email_notifications_one: Option<Row>,
        }

        let query = "mutation QueueEmail($email: email_notifications_insert_input!) { insert_email_notifications_one(object: $email) { id } }";
        let variables = Variables::new().with(
            "email",
            Variables::new()
                .with("recipient_email", email.recipient_email)
                .with("subject", email.subject)
                .with("body", email.body)
                .with("template_type", email.template_type)
                .with("template_data", email.template_data)
                .with("status", "pending"),
        );
        let result = self
            .runner
            .execute(ctx, RemoteQuery::new(query, variables))
            .await?;
        let Inserted {
            insert_email_notifications_one,
        } = result.decode()?;
        Ok(insert_email_notifications_one.map(|r| r.id))
    }
}
