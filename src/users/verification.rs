use std::sync::{Arc, Mutex, PoisonError};

use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{
    mailer::{Mailer, MailerError},
    users::{
        repo::{RepoError, UserRepository},
        repo_types::EmailVerification,
        validate::{self, ValidationError},
    },
};

pub const CODE_LEN: usize = 6;
pub const CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const VERIFICATION_TTL: Duration = Duration::hours(24);

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not store email verification: {0}")]
    Storage(#[source] RepoError),
    #[error("could not deliver email verification: {0}")]
    Delivery(#[source] MailerError),
}

/// Identity the verification mail is sent as, and where its link points.
#[derive(Debug, Clone)]
pub struct VerificationSender {
    pub name: String,
    pub address: String,
    pub endpoint: String,
}

pub struct EmailVerifier {
    repo: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    sender: VerificationSender,
    rng: Mutex<StdRng>,
}

impl EmailVerifier {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        mailer: Arc<dyn Mailer>,
        sender: VerificationSender,
        rng: StdRng,
    ) -> Self {
        Self {
            repo,
            mailer,
            sender,
            rng: Mutex::new(rng),
        }
    }

    /// Same as [`EmailVerifier::new`] with an entropy-seeded generator.
    pub fn from_entropy(
        repo: Arc<dyn UserRepository>,
        mailer: Arc<dyn Mailer>,
        sender: VerificationSender,
    ) -> Self {
        Self::new(repo, mailer, sender, StdRng::from_entropy())
    }

    fn generate_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    fn link(&self, code: &str) -> String {
        format!("{}/{}", self.sender.endpoint.trim_end_matches('/'), code)
    }

    fn compose(&self, username: &str, to: &str, code: &str) -> String {
        format!(
            "From: {} <{}>\r\nTo: {}\r\nSubject: {} Email Verification\r\n\r\n\
             Hi {},\r\n\r\nPlease click the following link to verify your email address: {}\r\n",
            self.sender.name,
            self.sender.address,
            to,
            self.sender.name,
            username,
            self.link(code),
        )
    }

    pub async fn send(
        &self,
        user_id: &str,
        username: &str,
        to: &str,
    ) -> Result<EmailVerification, VerificationError> {
        self.send_at(user_id, username, to, OffsetDateTime::now_utc())
            .await
    }

    pub async fn send_at(
        &self,
        user_id: &str,
        username: &str,
        to: &str,
        now: OffsetDateTime,
    ) -> Result<EmailVerification, VerificationError> {
        let user_id = validate::id(user_id)?;
        validate::email(to)?;

        let rec = EmailVerification {
            code: self.generate_code(),
            user_id,
            created_at: now,
            expires_at: now + VERIFICATION_TTL,
        };
        self.repo
            .insert_email_verification(rec.clone())
            .await
            .map_err(VerificationError::Storage)?;

        let message = self.compose(username, to, &rec.code);
        self.mailer
            .send(&self.sender.name, to, message.as_bytes())
            .await
            .map_err(VerificationError::Delivery)?;

        info!(user_id = %user_id, "email verification sent");
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::testing::{InMemoryUserRepository, RecordingMailer};
    use time::macros::datetime;
    use uuid::Uuid;

    fn sender() -> VerificationSender {
        VerificationSender {
            name: "userhub".into(),
            address: "noreply@userhub.test".into(),
            endpoint: "https://userhub.test/verify/".into(),
        }
    }

    fn verifier(
        repo: &Arc<InMemoryUserRepository>,
        mailer: &Arc<RecordingMailer>,
        seed: u64,
    ) -> EmailVerifier {
        EmailVerifier::new(
            repo.clone(),
            mailer.clone(),
            sender(),
            StdRng::seed_from_u64(seed),
        )
    }

    #[tokio::test]
    async fn persists_code_with_24h_window_and_mails_link() {
        let repo = Arc::new(InMemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let user_id = Uuid::new_v4();
        let now = datetime!(2024-05-10 08:30:00 UTC);

        let rec = verifier(&repo, &mailer, 7)
            .send_at(&user_id.to_string(), "janedoe", "jane@example.com", now)
            .await
            .expect("send");

        assert_eq!(rec.code.len(), CODE_LEN);
        assert!(rec.code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert_eq!(rec.user_id, user_id);
        assert_eq!(rec.created_at, now);
        assert_eq!(rec.expires_at - rec.created_at, Duration::hours(24));
        assert_eq!(repo.verifications(), vec![rec.clone()]);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        let (from_name, to, body) = &sent[0];
        assert_eq!(from_name, "userhub");
        assert_eq!(to, "jane@example.com");
        let body = String::from_utf8(body.clone()).unwrap();
        assert!(body.starts_with("From: userhub <noreply@userhub.test>\r\nTo: jane@example.com\r\n"));
        assert!(body.contains(&format!("https://userhub.test/verify/{}\r\n", rec.code)));
    }

    #[tokio::test]
    async fn seeded_generator_is_deterministic() {
        let repo = Arc::new(InMemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let id = Uuid::new_v4().to_string();

        let a = verifier(&repo, &mailer, 42)
            .send(&id, "janedoe", "jane@example.com")
            .await
            .unwrap();
        let b = verifier(&repo, &mailer, 42)
            .send(&id, "janedoe", "jane@example.com")
            .await
            .unwrap();
        assert_eq!(a.code, b.code);
    }

    #[tokio::test]
    async fn storage_failure_skips_delivery() {
        let repo = Arc::new(InMemoryUserRepository::default().failing_verifications());
        let mailer = Arc::new(RecordingMailer::default());

        let err = verifier(&repo, &mailer, 1)
            .send(&Uuid::new_v4().to_string(), "janedoe", "jane@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Storage(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_reported() {
        let repo = Arc::new(InMemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::failing());

        let err = verifier(&repo, &mailer, 1)
            .send(&Uuid::new_v4().to_string(), "janedoe", "jane@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Delivery(_)));
        // The record is already stored; a resend issues a fresh code.
        assert_eq!(repo.verifications().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_touches_nothing() {
        let repo = Arc::new(InMemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let v = verifier(&repo, &mailer, 1);

        let err = v.send("nope", "janedoe", "jane@example.com").await.unwrap_err();
        assert!(matches!(
            err,
            VerificationError::Validation(ValidationError::InvalidId)
        ));
        let err = v
            .send(&Uuid::new_v4().to_string(), "janedoe", "jane")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::Validation(ValidationError::InvalidEmail)
        ));
        assert!(repo.verifications().is_empty());
        assert!(mailer.sent().is_empty());
    }
}
