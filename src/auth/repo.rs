use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, instrument};

use crate::{
    auth::repo_types::{NewUser, UserRecord},
    context::RequestContext,
    graphql::{QueryError, QueryRunner, RemoteQuery, Variables},
};

const USER_FIELDS: &str = "id email username full_name password_hash avatar_url bio created_at updated_at";

#[derive(Debug, Error)]
pub enum UserRepoError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("user creation failed: no record returned")]
    Creation,
    /// The store's uniqueness constraint rejected the insert.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(
        &self,
        ctx: &RequestContext,
        user: NewUser,
    ) -> Result<UserRecord, UserRepoError>;

    async fn get_user_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Option<UserRecord>, UserRepoError>;

    async fn get_user_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<Option<UserRecord>, UserRepoError>;
}

/// `users` table behind the GraphQL gateway.
pub struct GraphqlUserRepository {
    runner: Arc<dyn QueryRunner>,
}

impl GraphqlUserRepository {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }

    async fn first_user_where(
        &self,
        ctx: &RequestContext,
        field: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, UserRepoError> {
        #[derive(Deserialize)]
        struct Users {
            users: Vec<UserRecord>,
        }

        let query = format!(
            "query GetUserBy($value: String!) {{ users(where: {{{field}: {{_eq: $value}}}}, limit: 1) {{ {USER_FIELDS} }} }}"
        );
        let result = self
            .runner
            .execute(ctx, RemoteQuery::new(query, Variables::new().with("value", value)))
            .await?;
        let Users { users } = result.decode()?;
        Ok(users.into_iter().next())
    }
}

#[async_trait]
impl UserRepository for GraphqlUserRepository {
    #[instrument(skip(self, ctx, user), fields(user_id = %user.id))]
    async fn create_user(
        &self,
        ctx: &RequestContext,
        user: NewUser,
    ) -> Result<UserRecord, UserRepoError> {
        #[derive(Deserialize)]
        struct Inserted {
            insert_users_one: Option<UserRecord>,
        }

        let query = format!(
            "mutation CreateUser($user: users_insert_input!) {{ insert_users_one(object: $user) {{ {USER_FIELDS} }} }}"
        );
        let variables = Variables::new().with(
            "user",
            Variables::new()
                .with("id", user.id)
                .with("email", user.email)
                .with("username", user.username)
                .with("full_name", user.full_name)
                .with("password_hash", user.password_hash),
        );

        let result = match self.runner.execute(ctx, RemoteQuery::new(query, variables)).await {
            Ok(r) => r,
            Err(e) if e.is_constraint_violation() => {
                return Err(UserRepoError::Duplicate(duplicate_field(&e)));
            }
            Err(e) => return Err(e.into()),
        };

        let Inserted { insert_users_one } = result.decode()?;
        insert_users_one.ok_or_else(|| {
            error!("insert_users_one returned null");
            UserRepoError::Creation
        })
    }

    #[instrument(skip(self, ctx))]
    async fn get_user_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Option<UserRecord>, UserRepoError> {
        self.first_user_where(ctx, "email", email).await
    }

    #[instrument(skip(self, ctx))]
    async fn get_user_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<Option<UserRecord>, UserRepoError> {
        self.first_user_where(ctx, "username", username).await
    }
}

/// Which unique column a constraint-violation message refers to.
fn duplicate_field(err: &QueryError) -> &'static str {
    let message = match err {
        QueryError::Remote { message, .. } => message.as_str(),
        _ => "",
    };
    if message.contains("username") {
        "username"
    } else if message.contains("email") {
        "email"
    } else {
        "account"
    }
}
