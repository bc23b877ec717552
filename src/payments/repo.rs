use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::repo_types::{NewPurchase, PurchaseRecord, PurchaseStatus};
use crate::{
    context::RequestContext,
    graphql::{QueryError, QueryRunner, RemoteQuery, Variables},
};

#[derive(Debug, Error)]
pub enum PurchaseRepoError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("purchase was not created")]
    Creation,
}

const PURCHASE_FIELDS: &str = "id user_id recipe_id amount transaction_id status";

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Persists a new purchase in `pending` state.
    async fn create_purchase(
        &self,
        ctx: &RequestContext,
        purchase: NewPurchase,
    ) -> Result<PurchaseRecord, PurchaseRepoError>;

    /// Moves a `pending` purchase to `status`. Returns the number of records
    /// changed; purchases already in a final state are left alone.
    async fn update_purchase_status(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
        status: PurchaseStatus,
    ) -> Result<u64, PurchaseRepoError>;

    async fn get_purchase_by_transaction(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<Option<PurchaseRecord>, PurchaseRepoError>;
}

pub struct GraphqlPurchaseRepository {
    runner: Arc<dyn QueryRunner>,
}

impl GraphqlPurchaseRepository {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PurchaseRepository for GraphqlPurchaseRepository {
    #[instrument(skip(self, ctx, purchase), fields(tx_ref = %purchase.transaction_id))]
    async fn create_purchase(
        &self,
        ctx: &RequestContext,
        purchase: NewPurchase,
    ) -> Result<PurchaseRecord, PurchaseRepoError> {
        #[derive(Deserialize)]
        struct Inserted {
            insert_purchases_one: Option<PurchaseRecord>,
        }

        let query = format!(
            "mutation CreatePurchase($purchase: purchases_insert_input!) {{ insert_purchases_one(object: $purchase) {{ {PURCHASE_FIELDS} }} }}"
        );
        let variables = Variables::new().with(
            "purchase",
            Variables::new()
                .with("id", Uuid::new_v4())
                .with("user_id", purchase.user_id)
                .with("recipe_id", purchase.recipe_id)
                .with("amount", purchase.amount.as_f64())
                .with("transaction_id", purchase.transaction_id)
                .with("status", PurchaseStatus::Pending.as_str()),
        );
        let result = self
            .runner
            .execute(ctx, RemoteQuery::new(query, variables))
            .await?;
        let Inserted {
            insert_purchases_one,
        } = result.decode()?;
        insert_purchases_one.ok_or(PurchaseRepoError::Creation)
    }

    #[instrument(skip(self, ctx), fields(status = status.as_str()))]
    async fn update_purchase_status(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
        status: PurchaseStatus,
    ) -> Result<u64, PurchaseRepoError> {
        #[derive(Deserialize)]
        struct Affected {
            affected_rows: u64,
        }
        #[derive(Deserialize)]
        struct Updated {
            update_purchases: Option<Affected>,
        }

        let query = "mutation UpdatePurchaseStatus($transaction_id: String!, $status: String!) { update_purchases(where: {transaction_id: {_eq: $transaction_id}, status: {_eq: \"pending\"}}, _set: {status: $status}) { affected_rows } }";
        let variables = Variables::new()
            .with("transaction_id", transaction_id)
            .with("status", status.as_str());
        let result = self
            .runner
            .execute(ctx, RemoteQuery::new(query, variables))
            .await?;
        let Updated { update_purchases } = result.decode()?;
        Ok(update_purchases.map_or(0, |a| a.affected_rows))
    }

    #[instrument(skip(self, ctx))]
    async fn get_purchase_by_transaction(
        &self,
        ctx: &RequestContext,
        transaction_id: &str,
    ) -> Result<Option<PurchaseRecord>, PurchaseRepoError> {
        #[derive(Deserialize)]
        struct Rows {
            purchases: Vec<PurchaseRecord>,
        }

        let query = format!(
            "query GetPurchaseByTransaction($transaction_id: String!) {{ purchases(where: {{transaction_id: {{_eq: $transaction_id}}}}, limit: 1) {{ {PURCHASE_FIELDS} }} }}"
        );
        let variables = Variables::new().with("transaction_id", transaction_id);
        let result = self
            .runner
            .execute(ctx, RemoteQuery::new(query, variables))
            .await?;
        let Rows { purchases } = result.decode()?;
        Ok(purchases.into_iter().next())
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::graphql::{testing::ScriptedRunner, value::Value};
    use crate::payments::repo_types::Amount;

    fn new_purchase(user_id: Uuid) -> NewPurchase {
        NewPurchase {
            user_id,
            recipe_id: "recipe-1".into(),
            amount: "25.00".parse().unwrap(),
            transaction_id: "tx-1".into(),
        }
    }

    #[tokio::test]
    async fn create_sends_pending_and_returns_record() {
        let user_id = Uuid::new_v4();
        let runner = Arc::new(ScriptedRunner::new(move |q| {
            let p = q.variables.get("purchase").and_then(Value::as_object).unwrap();
            Ok(json!({"insert_purchases_one": {
                "id": Uuid::new_v4(),
                "user_id": user_id,
                "recipe_id": p.get("recipe_id").and_then(Value::as_str).unwrap(),
                "amount": 25,
                "transaction_id": "tx-1",
                "status": p.get("status").and_then(Value::as_str).unwrap(),
            }}))
        }));
        let repo = GraphqlPurchaseRepository::new(runner.clone());
        let record = repo
            .create_purchase(&RequestContext::background(), new_purchase(user_id))
            .await
            .unwrap();
        assert_eq!(record.status, PurchaseStatus::Pending);
        assert_eq!(record.amount, Amount::from_cents(2500).unwrap());
        assert_eq!(record.recipe_id, "recipe-1");
    }

    #[tokio::test]
    async fn null_insert_is_a_creation_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(json!({"insert_purchases_one": null}))));
        let repo = GraphqlPurchaseRepository::new(runner);
        let err = repo
            .create_purchase(&RequestContext::background(), new_purchase(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseRepoError::Creation));
    }

    #[tokio::test]
    async fn update_targets_pending_rows_only() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(json!({"update_purchases": {"affected_rows": 0}}))
        }));
        let repo = GraphqlPurchaseRepository::new(runner.clone());
        let changed = repo
            .update_purchase_status(&RequestContext::background(), "tx-1", PurchaseStatus::Completed)
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let sent = runner.last().unwrap();
        assert!(sent.query.contains("status: {_eq: \"pending\"}"));
        assert_eq!(sent.variables.get("status"), Some(&Value::from("completed")));
        assert_eq!(sent.variables.get("transaction_id"), Some(&Value::from("tx-1")));
    }

    #[tokio::test]
    async fn lookup_by_transaction_absent_is_none() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(json!({"purchases": []}))));
        let repo = GraphqlPurchaseRepository::new(runner);
        let found = repo
            .get_purchase_by_transaction(&RequestContext::background(), "nope")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn memory_store_lifecycle() {
        let repo = testing::MemoryPurchases::default();
        let ctx = RequestContext::background();
        let created = repo.create_purchase(&ctx, new_purchase(Uuid::new_v4())).await.unwrap();
        assert_eq!(created.amount.to_string(), "25.00");

        let changed = repo
            .update_purchase_status(&ctx, "tx-1", PurchaseStatus::Completed)
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let read = repo.get_purchase_by_transaction(&ctx, "tx-1").await.unwrap().unwrap();
        assert_eq!(read.status, PurchaseStatus::Completed);

        let changed = repo
            .update_purchase_status(&ctx, "tx-1", PurchaseStatus::Failed)
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }
}
