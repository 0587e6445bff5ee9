use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::users::{
    claims::{Claims, Role, UnknownRole},
    validate::{self, ValidationError},
};

/// Validity window of an issued token.
pub const TOKEN_TTL: Duration = Duration::hours(24);

/// The only signing algorithm accepted, on issue and on verify.
const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token claims are malformed: {0}")]
    Claims(String),
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signs and checks bearer tokens with a process-wide symmetric key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is compared against the caller's clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, user_id: &str, role: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, role, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        role: &str,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let user_id = validate::id(user_id)?;
        let role: Role = role
            .parse()
            .map_err(|UnknownRole(r)| TokenError::InvalidRole(r))?;

        let claims = Claims {
            user_id,
            role,
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };
        let token =
            encode(&Header::new(ALGORITHM), &claims, &self.encoding).map_err(TokenError::Signing)?;
        debug!(user_id = %user_id, role = %role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Checks, in order: emptiness, header algorithm, signature, claim
    /// shape and expiry. A token whose `exp` equals `now` is expired.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let header = decode_header(token).map_err(|e| {
            warn!(error = %e, "unreadable jwt header");
            TokenError::Invalid
        })?;
        if header.alg != ALGORITHM {
            warn!(alg = ?header.alg, "unexpected jwt signing algorithm");
            return Err(TokenError::Invalid);
        }

        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(classify)?
            .claims;

        if claims.exp <= now.unix_timestamp() {
            debug!(user_id = %claims.user_id, "jwt expired");
            return Err(TokenError::Expired);
        }

        debug!(user_id = %claims.user_id, role = %claims.role, "jwt verified");
        Ok(claims)
    }
}

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        ErrorKind::Json(inner) => TokenError::Claims(inner.to_string()),
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::Claims(format!("missing field `{claim}`"))
        }
        _ => {
            warn!(error = %e, "jwt rejected");
            TokenError::Invalid
        }
    }
}
