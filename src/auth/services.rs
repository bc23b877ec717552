use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        jwt::{strip_bearer, TokenService},
        password::CredentialHasher,
        repo::{UserRepoError, UserRepository},
        repo_types::NewUser,
    },
    context::RequestContext,
    error::AppError,
    notifications::{templates, worker::Notifier},
    state::AppState,
};

pub const USERNAME_LEN: (usize, usize) = (3, 50);
pub const FULL_NAME_LEN: (usize, usize) = (2, 100);
pub const PASSWORD_LEN: (usize, usize) = (6, 128);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_len(
    field: &'static str,
    label: &str,
    value: &str,
    (min, max): (usize, usize),
) -> Result<(), AppError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(AppError::validation(
            field,
            format!("{label} must be between {min} and {max} characters"),
        ));
    }
    Ok(())
}

/// Normalizes a registration request and checks every field's shape.
pub fn validate_registration(mut req: RegisterRequest) -> Result<RegisterRequest, AppError> {
    req.email = normalize_email(&req.email);
    req.username = req.username.trim().to_string();
    req.full_name = req.full_name.trim().to_string();

    if !is_valid_email(&req.email) {
        return Err(AppError::validation(
            "email",
            "Please provide a valid email address",
        ));
    }
    check_len("username", "Username", &req.username, USERNAME_LEN)?;
    check_len("full_name", "Full name", &req.full_name, FULL_NAME_LEN)?;
    check_len("password", "Password", &req.password, PASSWORD_LEN)?;
    Ok(req)
}

fn repo_error(e: UserRepoError) -> AppError {
    match e {
        UserRepoError::Query(q) => AppError::Remote(q),
        UserRepoError::Creation => AppError::Persistence("user creation returned no record".into()),
        UserRepoError::Duplicate(field) => AppError::Conflict(field),
    }
}

/// Register, login and refresh over the hasher, token service and user store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
    hasher: CredentialHasher,
    notifier: Notifier,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.users.clone(),
            state.tokens.clone(),
            state.notifier.clone(),
        )
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: TokenService, notifier: Notifier) -> Self {
        Self {
            users,
            tokens,
            hasher: CredentialHasher::new(),
            notifier,
        }
    }

    /// Existence checks here are a fast path only; the store's uniqueness
    /// constraint decides races and surfaces as `Conflict` too.
    #[instrument(skip(self, ctx, req), fields(email = %req.email))]
    pub async fn register(
        &self,
        ctx: &RequestContext,
        req: RegisterRequest,
    ) -> Result<AuthResponse, AppError> {
        let req = validate_registration(req)?;

        if self
            .users
            .get_user_by_email(ctx, &req.email)
            .await
            .map_err(repo_error)?
            .is_some()
        {
            warn!(email = %req.email, "email already registered");
            return Err(AppError::Conflict("email"));
        }
        if self
            .users
            .get_user_by_username(ctx, &req.username)
            .await
            .map_err(repo_error)?
            .is_some()
        {
            warn!(username = %req.username, "username already taken");
            return Err(AppError::Conflict("username"));
        }

        let password_hash = self.hasher.hash(&req.password).map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::Internal(e.to_string())
        })?;

        let user = self
            .users
            .create_user(
                ctx,
                NewUser {
                    id: Uuid::new_v4(),
                    email: req.email,
                    username: req.username,
                    full_name: req.full_name,
                    password_hash,
                },
            )
            .await
            .map_err(repo_error)?;

        let token = self.issue(user.id, &user.email)?;
        info!(user_id = %user.id, email = %user.email, "user registered");

        match templates::render("welcome", &json!({ "user_name": user.full_name })) {
            Ok((subject, body)) => self.notifier.dispatch(templates::EmailMessage {
                to: user.email.clone(),
                subject,
                body,
            }),
            Err(e) => warn!(error = %e, "welcome email not rendered"),
        }

        Ok(AuthResponse {
            token,
            user: PublicUser::from(&user),
        })
    }

    /// Unknown email and wrong password fail identically.
    #[instrument(skip(self, ctx, req))]
    pub async fn login(
        &self,
        ctx: &RequestContext,
        req: LoginRequest,
    ) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&req.email);

        let user = match self
            .users
            .get_user_by_email(ctx, &email)
            .await
            .map_err(repo_error)?
        {
            Some(u) => u,
            None => {
                self.hasher.verify_decoy(&req.password);
                warn!(email = %email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(&req.password, &user.password_hash) {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.issue(user.id, &user.email)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse {
            token,
            user: PublicUser::from(&user),
        })
    }

    pub fn refresh(&self, raw: &str) -> Result<String, AppError> {
        self.tokens.refresh(strip_bearer(raw)).map_err(|e| {
            warn!(error = %e, "token refresh rejected");
            AppError::Unauthorized
        })
    }

    fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AppError> {
        self.tokens.issue(user_id, email).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AppError::Internal(e.to_string())
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::auth::repo_types::UserRecord;

    /// In-memory user table with the store's uniqueness rules.
    #[derive(Default)]
    pub struct MemoryUsers {
        pub rows: Mutex<Vec<UserRecord>>,
    }

    #[async_trait]
    impl UserRepository for MemoryUsers {
        async fn create_user(
            &self,
            _ctx: &RequestContext,
            user: NewUser,
        ) -> Result<UserRecord, UserRepoError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|r| r.email == user.email) {
                return Err(UserRepoError::Duplicate("email"));
            }
            if rows.iter().any(|r| r.username == user.username) {
                return Err(UserRepoError::Duplicate("username"));
            }
            let record = UserRecord {
                id: user.id,
                email: user.email,
                username: user.username,
                full_name: user.full_name,
                password_hash: user.password_hash,
                avatar_url: None,
                bio: None,
                created_at: OffsetDateTime::now_utc(),
                updated_at: None,
            };
            rows.push(record.clone());
            Ok(record)
        }

        async fn get_user_by_email(
            &self,
            _ctx: &RequestContext,
            email: &str,
        ) -> Result<Option<UserRecord>, UserRepoError> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.email == email).cloned())
        }

        async fn get_user_by_username(
            &self,
            _ctx: &RequestContext,
            username: &str,
        ) -> Result<Option<UserRecord>, UserRepoError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.username == username)
                .cloned())
        }
    }
}
