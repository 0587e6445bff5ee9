use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::users::dto::CreateUserInput;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
const EMAIL_MAX_LEN: usize = 254;
const FULLNAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("id must be a valid UUID")]
    InvalidId,
    #[error("email is malformed")]
    InvalidEmail,
    #[error("password must be at least {PASSWORD_MIN_LEN} characters")]
    PasswordTooShort,
    #[error("password must be at most {PASSWORD_MAX_LEN} characters")]
    PasswordTooLong,
    #[error("password must contain at least one letter and one digit")]
    PasswordTooWeak,
    #[error("username must be 3-32 characters of letters, digits, '_', '.' or '-'")]
    InvalidUsername,
    #[error("fullname must not be blank")]
    EmptyFullname,
    #[error("fullname must be at most {FULLNAME_MAX_LEN} characters")]
    FullnameTooLong,
    #[error("birthdate must not be in the future")]
    BirthdateInFuture,
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").unwrap();
}

/// Parses an opaque user id.
pub fn id(raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidId)
}

pub fn email(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() || raw.len() > EMAIL_MAX_LEN || !EMAIL_RE.is_match(raw) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn password(raw: &str) -> Result<(), ValidationError> {
    let len = raw.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if len > PASSWORD_MAX_LEN {
        return Err(ValidationError::PasswordTooLong);
    }
    let has_letter = raw.chars().any(char::is_alphabetic);
    let has_digit = raw.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ValidationError::PasswordTooWeak);
    }
    Ok(())
}

pub fn username(raw: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(raw) {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

pub fn fullname(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyFullname);
    }
    if raw.chars().count() > FULLNAME_MAX_LEN {
        return Err(ValidationError::FullnameTooLong);
    }
    Ok(())
}

pub fn birthdate(date: Date, today: Date) -> Result<(), ValidationError> {
    if date > today {
        return Err(ValidationError::BirthdateInFuture);
    }
    Ok(())
}

impl CreateUserInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        fullname(&self.fullname)?;
        username(&self.username)?;
        email(&self.email)?;
        birthdate(self.birthdate, OffsetDateTime::now_utc().date())?;
        password(&self.password)
    }
}
