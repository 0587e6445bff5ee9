use async_trait::async_trait;
use lettre::{
    address::Envelope, transport::smtp::authentication::Credentials, Address, AsyncSmtpTransport,
    AsyncTransport, Tokio1Executor,
};
use thiserror::Error;
use tracing::debug;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// Outbound mail transport. `raw` is a complete RFC 5322 message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from_name: &str, to: &str, raw: &[u8]) -> Result<(), MailerError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Address,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, from_address: &str) -> anyhow::Result<Self> {
        let from: Address = from_address.parse()?;

        let transport = match (&smtp.username, &smtp.password) {
            (Some(user), Some(pass)) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
                    .credentials(Credentials::new(user.clone(), pass.clone()));
                if let Some(port) = smtp.port {
                    builder = builder.port(port);
                }
                builder.build()
            }
            // Local relays (Mailpit, MailHog) run without TLS or auth.
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                .port(smtp.port.unwrap_or(25))
                .build(),
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, from_name: &str, to: &str, raw: &[u8]) -> Result<(), MailerError> {
        let to: Address = to
            .parse()
            .map_err(|e| MailerError::Address(format!("{e}")))?;
        let envelope = Envelope::new(Some(self.from.clone()), vec![to])
            .map_err(|e| MailerError::Address(e.to_string()))?;

        self.transport
            .send_raw(&envelope, raw)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;
        debug!(from = %from_name, "mail handed to smtp relay");
        Ok(())
    }
}
