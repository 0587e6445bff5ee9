use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;
use crate::mailer::SmtpMailer;
use crate::users::{
    jwt::TokenCodec,
    password::PasswordHasher,
    repo::{PgUserRepository, UserRepository},
    services::UserService,
    verification::{EmailVerifier, VerificationSender},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }

    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let repo: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db.clone()));
        let hasher = PasswordHasher::new(&config.hashing).context("argon2 parameters")?;
        let mut users = UserService::new(repo.clone(), TokenCodec::new(&config.jwt.secret), hasher)
            .context("build user service")?;

        match &config.email {
            Some(email) => {
                let mailer = SmtpMailer::new(&email.smtp, &email.sender_address)
                    .context("build smtp mailer")?;
                let sender = VerificationSender {
                    name: email.sender_name.clone(),
                    address: email.sender_address.clone(),
                    endpoint: email.endpoint.clone(),
                };
                users = users.with_email_verification(EmailVerifier::from_entropy(
                    repo,
                    Arc::new(mailer),
                    sender,
                ));
                tracing::info!(endpoint = %email.endpoint, "email verification enabled");
            }
            None => tracing::info!("email verification disabled"),
        }

        Ok(Self::new(Arc::new(users)))
    }
}
