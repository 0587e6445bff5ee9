use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::users::{claims::Role, dto::User};

/// User row in the database.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String, // unique
    pub birthdate: Date,
    pub email_verified: bool,
    pub password_hash: String, // Argon2 PHC string
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Verification code row, one per send.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EmailVerification {
    pub code: String,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = String;

    fn try_from(rec: UserRecord) -> Result<Self, Self::Error> {
        let role: Role = rec
            .role
            .parse()
            .map_err(|_| format!("invalid stored role: {}", rec.role))?;
        Ok(User {
            id: rec.id,
            fullname: rec.fullname,
            username: rec.username,
            email: rec.email,
            birthdate: rec.birthdate,
            email_verified: rec.email_verified,
            role,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        })
    }
}
