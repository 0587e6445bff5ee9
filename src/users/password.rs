use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

use crate::config::HashingConfig;

#[derive(Debug, Error)]
pub enum HashError {
    /// The password does not match the digest.
    #[error("password mismatch")]
    Mismatch,
    #[error("could not hash password: {0}")]
    Hashing(String),
    #[error("stored digest is malformed: {0}")]
    MalformedDigest(String),
}

/// Argon2id hasher; the salt travels inside the PHC digest string.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(cfg: &HashingConfig) -> Result<Self, HashError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hashes on the blocking pool so the runtime keeps serving requests.
    pub async fn hash(&self, plain: &str) -> Result<String, HashError> {
        let hasher = self.clone();
        let plain = plain.to_string();
        tokio::task::spawn_blocking(move || hasher.hash_sync(&plain))
            .await
            .map_err(|e| {
                error!(error = %e, "argon2 hash task failed");
                HashError::Hashing(e.to_string())
            })?
    }

    pub async fn verify(&self, digest: &str, plain: &str) -> Result<(), HashError> {
        let hasher = self.clone();
        let digest = digest.to_string();
        let plain = plain.to_string();
        tokio::task::spawn_blocking(move || hasher.verify_sync(&digest, &plain))
            .await
            .map_err(|e| {
                error!(error = %e, "argon2 verify task failed");
                HashError::Hashing(e.to_string())
            })?
    }

    pub(crate) fn hash_sync(&self, plain: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                HashError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify_sync(&self, digest: &str, plain: &str) -> Result<(), HashError> {
        let parsed = PasswordHash::new(digest).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            HashError::MalformedDigest(e.to_string())
        })?;
        match self.argon2.verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(HashError::Mismatch),
            Err(e) => {
                error!(error = %e, "argon2 verify_password error");
                Err(HashError::Hashing(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> PasswordHasher {
    PasswordHasher::new(&HashingConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap params are valid")
}
