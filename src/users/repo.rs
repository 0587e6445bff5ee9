use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{EmailVerification, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate record")]
    Duplicate,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Durable user state. `Ok(None)` from a select means "not found".
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, RepoError>;
    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
    async fn select_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
    async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError>;
    async fn insert_email_verification(&self, rec: EmailVerification) -> Result<(), RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, RepoError> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, fullname, username, email, birthdate, email_verified,
                               password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, fullname, username, email, birthdate, email_verified,
                      password_hash, role, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.fullname)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.birthdate)
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Duplicate
            } else {
                RepoError::Storage(anyhow::Error::new(e).context("insert user"))
            }
        })
    }

    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, fullname, username, email, birthdate, email_verified,
                   password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user by id")?;
        Ok(user)
    }

    async fn select_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, fullname, username, email, birthdate, email_verified,
                   password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        Ok(user)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE users
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .context("soft delete user")?;
        Ok(())
    }

    async fn insert_email_verification(&self, rec: EmailVerification) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO email_verifications (code, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&rec.code)
        .bind(rec.user_id)
        .bind(rec.created_at)
        .bind(rec.expires_at)
        .execute(&self.db)
        .await
        .context("insert email verification")?;
        Ok(())
    }
}
