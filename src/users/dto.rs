use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::users::claims::Role;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Request body for account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub fullname: String,
    pub username: String,
    pub email: String,
    #[serde(with = "iso_date")]
    pub birthdate: Date,
    pub password: String,
}

/// Domain view of a user; the password digest never leaves the service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    #[serde(with = "iso_date")]
    pub birthdate: Date,
    pub email_verified: bool,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Request body for token issuance.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Request body for explicit token verification.
#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Identity proven by a verified token. `role` comes from the token, so a
/// role change only shows up after the token is reissued.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifiedToken {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub username: String,
    pub email: String,
}
