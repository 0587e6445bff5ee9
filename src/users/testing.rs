//! In-memory fakes for the repository and mailer seams.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    mailer::{Mailer, MailerError},
    users::{
        repo::{RepoError, UserRepository},
        repo_types::{EmailVerification, UserRecord},
    },
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    // (record, soft-deleted)
    users: Mutex<HashMap<Uuid, (UserRecord, bool)>>,
    verifications: Mutex<Vec<EmailVerification>>,
    insert_calls: AtomicUsize,
    fail_verifications: bool,
    fail_storage: bool,
}

impl InMemoryUserRepository {
    pub fn failing_verifications(mut self) -> Self {
        self.fail_verifications = true;
        self
    }

    pub fn failing_storage(mut self) -> Self {
        self.fail_storage = true;
        self
    }

    /// Writes a record directly, bypassing the service.
    pub fn seed(&self, rec: UserRecord) {
        self.users.lock().unwrap().insert(rec.id, (rec, false));
    }

    pub fn set_role(&self, id: Uuid, role: &str) {
        if let Some((rec, _)) = self.users.lock().unwrap().get_mut(&id) {
            rec.role = role.to_string();
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn verifications(&self) -> Vec<EmailVerification> {
        self.verifications.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.fail_storage {
            return Err(RepoError::Storage(anyhow::anyhow!("connection refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, RepoError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut users = self.users.lock().unwrap();
        // Mirrors the UNIQUE constraints, which also cover soft-deleted rows.
        if users.contains_key(&user.id) || users.values().any(|(u, _)| u.email == user.email) {
            return Err(RepoError::Duplicate);
        }
        users.insert(user.id, (user.clone(), false));
        Ok(user)
    }

    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        self.check()?;
        let users = self.users.lock().unwrap();
        Ok(users
            .get(&id)
            .filter(|(_, deleted)| !deleted)
            .map(|(u, _)| u.clone()))
    }

    async fn select_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        self.check()?;
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|(u, deleted)| !deleted && u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError> {
        self.check()?;
        if let Some((_, deleted)) = self.users.lock().unwrap().get_mut(&id) {
            *deleted = true;
        }
        Ok(())
    }

    async fn insert_email_verification(&self, rec: EmailVerification) -> Result<(), RepoError> {
        if self.fail_verifications {
            return Err(RepoError::Storage(anyhow::anyhow!("verification table unavailable")));
        }
        self.verifications.lock().unwrap().push(rec);
        Ok(())
    }
}

/// Stores every message it is handed.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, Vec<u8>)>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, from_name: &str, to: &str, raw: &[u8]) -> Result<(), MailerError> {
        if self.fail {
            return Err(MailerError::Transport("relay rejected message".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((from_name.to_string(), to.to_string(), raw.to_vec()));
        Ok(())
    }
}
