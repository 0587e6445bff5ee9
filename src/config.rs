use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

/// Argon2 cost parameters. Defaults match `argon2::Params::DEFAULT_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub sender_name: String,
    pub sender_address: String,
    pub endpoint: String,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub hashing: HashingConfig,
    pub email: Option<EmailConfig>,
}

/// Reads an optional variable; a value that is set but does not parse is an error.
fn parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_value(key, std::env::var(key).ok())
}

fn parse_value<T>(key: &str, raw: Option<String>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value {v:?}"))
    })
    .transpose()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
        };

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: parsed("HASH_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: parsed("HASH_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: parsed("HASH_PARALLELISM")?.unwrap_or(defaults.parallelism),
        };

        // Verification mail is only wired when every mandatory piece is present.
        let email = match (
            std::env::var("EMAIL_VERIFICATION_ENDPOINT"),
            std::env::var("EMAIL_SENDER_ADDRESS"),
            std::env::var("SMTP_HOST"),
        ) {
            (Ok(endpoint), Ok(sender_address), Ok(host)) => Some(EmailConfig {
                sender_name: std::env::var("EMAIL_SENDER_NAME")
                    .unwrap_or_else(|_| "userhub".into()),
                sender_address,
                endpoint,
                smtp: SmtpConfig {
                    host,
                    port: parsed("SMTP_PORT")?,
                    username: std::env::var("SMTP_USERNAME").ok(),
                    password: std::env::var("SMTP_PASSWORD").ok(),
                },
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            hashing,
            email,
        })
    }
}
