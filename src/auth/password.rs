use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

/// Salted Argon2id hashing of user passwords.
#[derive(Clone, Default)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes with a fresh random salt, so equal inputs give different digests.
    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                PasswordError(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Constant-time check. A digest that cannot be parsed never matches.
    pub fn verify(&self, plain: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password digest is malformed");
                return false;
            }
        };
        self.argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spends one full verification on a digest of a random secret, for
    /// logins whose account does not exist.
    pub fn verify_decoy(&self, plain: &str) {
        if let Some(digest) = decoy_digest() {
            let _ = self.verify(plain, digest);
        }
    }
}

fn decoy_digest() -> Option<&'static str> {
    lazy_static! {
        static ref DECOY: Option<String> = {
            let secret: String = OsRng
                .sample_iter(&Alphanumeric)
                .take(32)
                .map(char::from)
                .collect();
            CredentialHasher::new().hash(&secret).ok()
        };
    }
    DECOY.as_deref()
}
