use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::users::{
    claims::{Claims, Role},
    dto::{CreateUserInput, User, VerifiedToken},
    jwt::{TokenCodec, TokenError},
    password::{HashError, PasswordHasher},
    repo::{RepoError, UserRepository},
    repo_types::{EmailVerification, UserRecord},
    validate::{self, ValidationError},
    verification::{EmailVerifier, VerificationError},
};

/// Digest checked when the email is unknown so both login failures cost
/// one hash verification.
const DUMMY_DIGEST_INPUT: &str = "userhub-dummy-password-0";

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("user already exists")]
    AlreadyExists,
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("password hashing failed: {0}")]
    Hashing(#[source] HashError),
    #[error("storage error: {context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: RepoError,
    },
    #[error("could not map stored user: {0}")]
    Mapping(String),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("email verification is not configured")]
    EmailVerificationDisabled,
}

fn storage(context: &'static str) -> impl FnOnce(RepoError) -> UserError {
    move |source| UserError::Storage { context, source }
}

/// Account orchestration over the repository, hasher and token codec.
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    verifier: Option<EmailVerifier>,
    dummy_digest: String,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        codec: TokenCodec,
        hasher: PasswordHasher,
    ) -> Result<Self, UserError> {
        let dummy_digest = hasher
            .hash_sync(DUMMY_DIGEST_INPUT)
            .map_err(UserError::Hashing)?;
        Ok(Self {
            repo,
            codec,
            hasher,
            verifier: None,
            dummy_digest,
        })
    }

    pub fn with_email_verification(mut self, verifier: EmailVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create(&self, mut input: CreateUserInput) -> Result<User, UserError> {
        input.email = input.email.trim().to_lowercase();
        input.validate()?;

        let password_hash = self.hasher.hash(&input.password).await.map_err(|e| {
            error!(error = %e, "hash_password failed");
            UserError::Hashing(e)
        })?;

        let now = OffsetDateTime::now_utc();
        let inserted = self
            .repo
            .insert(UserRecord {
                id: Uuid::new_v4(),
                fullname: input.fullname,
                username: input.username,
                email: input.email,
                birthdate: input.birthdate,
                email_verified: false,
                password_hash,
                role: Role::User.as_str().to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|e| match e {
                RepoError::Duplicate => {
                    warn!("user already exists");
                    UserError::AlreadyExists
                }
                other => storage("insert user")(other),
            })?;

        let user = User::try_from(inserted).map_err(UserError::Mapping)?;
        info!(user_id = %user.id, "user created");

        if let Some(verifier) = &self.verifier {
            // Verification can be requested again later; creation stands.
            if let Err(e) = verifier
                .send(&user.id.to_string(), &user.username, &user.email)
                .await
            {
                error!(user_id = %user.id, error = %e, "could not send email verification");
            }
        }
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, id: &str) -> Result<User, UserError> {
        let id = validate::id(id)?;
        let rec = self
            .repo
            .select_by_id(id)
            .await
            .map_err(storage("select user by id"))?
            .ok_or(UserError::NotFound)?;
        User::try_from(rec).map_err(UserError::Mapping)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), UserError> {
        let id = validate::id(id)?;
        self.repo
            .delete_by_id(id)
            .await
            .map_err(storage("delete user by id"))?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Unknown email and wrong password both yield `InvalidCredentials`.
    #[instrument(skip(self, email, password))]
    pub async fn generate_token(&self, email: &str, password: &str) -> Result<String, UserError> {
        let email = email.trim().to_lowercase();
        validate::email(&email)?;
        validate::password(password)?;

        let rec = self
            .repo
            .select_by_email(&email)
            .await
            .map_err(storage("select user by email"))?;

        let Some(rec) = rec else {
            let _ = self.hasher.verify(&self.dummy_digest, password).await;
            warn!("token requested for unknown email");
            return Err(UserError::InvalidCredentials);
        };

        match self.hasher.verify(&rec.password_hash, password).await {
            Ok(()) => {}
            Err(HashError::Mismatch) => {
                warn!(user_id = %rec.id, "token requested with wrong password");
                return Err(UserError::InvalidCredentials);
            }
            Err(e) => {
                error!(user_id = %rec.id, error = %e, "verify_password failed");
                return Err(UserError::Hashing(e));
            }
        }

        let token = self.codec.issue(&rec.id.to_string(), &rec.role)?;
        info!(user_id = %rec.id, "token issued");
        Ok(token)
    }

    #[instrument(skip(self, token))]
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedToken, UserError> {
        let claims = self.codec.verify(token)?;
        self.resolve_claims(claims).await
    }

    #[cfg(test)]
    async fn verify_token_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<VerifiedToken, UserError> {
        let claims = self.codec.verify_at(token, now)?;
        self.resolve_claims(claims).await
    }

    async fn resolve_claims(&self, claims: Claims) -> Result<VerifiedToken, UserError> {
        // Catches users deleted after the token was issued.
        let rec = self
            .repo
            .select_by_id(claims.user_id)
            .await
            .map_err(storage("select user by id"))?
            .ok_or(UserError::NotFound)?;

        Ok(VerifiedToken {
            id: rec.id,
            username: rec.username,
            role: claims.role,
        })
    }

    #[instrument(skip(self, to))]
    pub async fn send_email_verification(
        &self,
        user_id: &str,
        username: &str,
        to: &str,
    ) -> Result<EmailVerification, UserError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or(UserError::EmailVerificationDisabled)?;
        Ok(verifier.send(user_id, username, to).await?)
    }
}
