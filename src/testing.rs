//! In-memory stand-ins for the stores behind `AppState`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::adapter::{AuthAdapter, NewAccount, SessionUser, CREDENTIALS_PROVIDER};
use crate::auth::email::{EmailMessage, Mailer};
use crate::auth::oauth::{OAuthProfile, OAuthProvider};
use crate::auth::repo::{NewUser, User, UserStore};
use crate::invoices::dto::{InvoiceInput, NewInvoice};
use crate::invoices::repo::InvoiceStore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct MemoryInvoiceStore {
    fail_with: Option<String>,
    inserted: Mutex<Vec<NewInvoice>>,
    updated: Mutex<Vec<(String, InvoiceInput)>>,
    deleted: Mutex<Vec<String>>,
    statements: Mutex<usize>,
}

impl MemoryInvoiceStore {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn statement(&self) -> anyhow::Result<()> {
        *lock(&self.statements) += 1;
        match &self.fail_with {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    pub fn inserted(&self) -> Vec<NewInvoice> {
        lock(&self.inserted).clone()
    }

    pub fn updated(&self) -> Vec<(String, InvoiceInput)> {
        lock(&self.updated).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn statements(&self) -> usize {
        *lock(&self.statements)
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn insert(&self, invoice: &NewInvoice) -> anyhow::Result<()> {
        self.statement()?;
        lock(&self.inserted).push(invoice.clone());
        Ok(())
    }

    async fn update(&self, id: &str, changes: &InvoiceInput) -> anyhow::Result<()> {
        self.statement()?;
        lock(&self.updated).push((id.to_string(), changes.clone()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.statement()?;
        lock(&self.deleted).push(id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    failing: bool,
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, name: &str, email: &str, password_hash: &str) {
        lock(&self.users).insert(
            email.to_string(),
            User {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                password: password_hash.to_string(),
            },
        );
    }

    pub fn get(&self, email: &str) -> Option<User> {
        lock(&self.users).get(email).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        if self.failing {
            return Err(anyhow!("users table unavailable"));
        }
        Ok(self.get(email))
    }

    async fn create(&self, user: &NewUser<'_>) -> anyhow::Result<()> {
        if self.failing {
            return Err(anyhow!("users table unavailable"));
        }
        let mut users = lock(&self.users);
        if users.contains_key(user.email) {
            return Err(anyhow!("duplicate key value violates unique constraint \"users_email_key\""));
        }
        users.insert(
            user.email.to_string(),
            User {
                id: Uuid::new_v4(),
                name: user.name.to_string(),
                email: user.email.to_string(),
                password: user.password_hash.to_string(),
            },
        );
        Ok(())
    }
}

struct AdapterUser {
    user: SessionUser,
    verified: bool,
}

#[derive(Default)]
struct AdapterTables {
    users: Vec<AdapterUser>,
    accounts: HashMap<(String, String), Uuid>,
    sessions: HashMap<String, (Uuid, OffsetDateTime)>,
    tokens: HashMap<(String, String), OffsetDateTime>,
}

impl AdapterTables {
    fn user(&self, id: Uuid) -> Option<SessionUser> {
        self.users
            .iter()
            .find(|u| u.user.id == id)
            .map(|u| u.user.clone())
    }
}

#[derive(Default)]
pub struct MemoryAdapter {
    failing: bool,
    tables: Mutex<AdapterTables>,
}

impl MemoryAdapter {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing {
            Err(anyhow!("auth adapter unavailable"))
        } else {
            Ok(())
        }
    }

    /// Registers `user` with a session that expires in a day.
    pub fn insert_session(&self, token: &str, user: SessionUser) {
        let expires = OffsetDateTime::now_utc() + time::Duration::days(1);
        self.insert_session_until(token, user, expires);
    }

    pub fn insert_session_until(&self, token: &str, user: SessionUser, expires: OffsetDateTime) {
        let mut t = lock(&self.tables);
        t.sessions.insert(token.to_string(), (user.id, expires));
        if !t.users.iter().any(|u| u.user.id == user.id) {
            t.users.push(AdapterUser {
                user,
                verified: false,
            });
        }
    }

    pub fn session_count(&self) -> usize {
        lock(&self.tables).sessions.len()
    }

    pub fn account_count(&self) -> usize {
        lock(&self.tables).accounts.len()
    }

    pub fn session_user(&self, token: &str) -> Option<SessionUser> {
        let t = lock(&self.tables);
        let (user_id, _) = t.sessions.get(token)?;
        t.user(*user_id)
    }
}

#[async_trait]
impl AuthAdapter for MemoryAdapter {
    async fn upsert_user(&self, email: &str, name: Option<&str>) -> anyhow::Result<SessionUser> {
        self.check()?;
        let mut t = lock(&self.tables);
        let Some(pos) = t.users.iter().position(|u| u.user.email == email) else {
            let user = SessionUser {
                id: Uuid::new_v4(),
                name: name.map(str::to_string),
                email: email.to_string(),
            };
            t.users.push(AdapterUser {
                user: user.clone(),
                verified: true,
            });
            return Ok(user);
        };

        let was_verified = t.users[pos].verified;
        let entry = &mut t.users[pos];
        entry.verified = true;
        if entry.user.name.is_none() {
            entry.user.name = name.map(str::to_string);
        }
        let user = entry.user.clone();

        if !was_verified {
            let before = t.accounts.len();
            t.accounts
                .retain(|(provider, _), id| !(*id == user.id && provider == CREDENTIALS_PROVIDER));
            if t.accounts.len() != before {
                t.sessions.retain(|_, (id, _)| *id != user.id);
            }
        }
        Ok(user)
    }

    async fn claim_unverified_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> anyhow::Result<Option<SessionUser>> {
        self.check()?;
        let mut t = lock(&self.tables);
        if let Some(entry) = t.users.iter_mut().find(|u| u.user.email == email) {
            if entry.verified {
                return Ok(None);
            }
            if entry.user.name.is_none() {
                entry.user.name = name.map(str::to_string);
            }
            return Ok(Some(entry.user.clone()));
        }
        let user = SessionUser {
            id: Uuid::new_v4(),
            name: name.map(str::to_string),
            email: email.to_string(),
        };
        t.users.push(AdapterUser {
            user: user.clone(),
            verified: false,
        });
        Ok(Some(user))
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<SessionUser>> {
        self.check()?;
        let t = lock(&self.tables);
        let key = (provider.to_string(), provider_account_id.to_string());
        Ok(t.accounts.get(&key).and_then(|id| t.user(*id)))
    }

    async fn link_account(&self, user_id: Uuid, account: &NewAccount<'_>) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.tables).accounts.insert(
            (
                account.provider.to_string(),
                account.provider_account_id.to_string(),
            ),
            user_id,
        );
        Ok(())
    }

    async fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.tables)
            .sessions
            .insert(token.to_string(), (user_id, expires));
        Ok(())
    }

    async fn get_session_user(&self, token: &str) -> anyhow::Result<Option<SessionUser>> {
        self.check()?;
        let t = lock(&self.tables);
        Ok(t
            .sessions
            .get(token)
            .filter(|(_, expires)| *expires > OffsetDateTime::now_utc())
            .and_then(|(id, _)| t.user(*id)))
    }

    async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.tables).sessions.remove(token);
        Ok(())
    }

    async fn create_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.tables)
            .tokens
            .insert((identifier.to_string(), token_hash.to_string()), expires);
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> anyhow::Result<Option<OffsetDateTime>> {
        self.check()?;
        Ok(lock(&self.tables)
            .tokens
            .remove(&(identifier.to_string(), token_hash.to_string())))
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        self.check()?;
        let now = OffsetDateTime::now_utc();
        let mut t = lock(&self.tables);
        let before = t.sessions.len() + t.tokens.len();
        t.sessions.retain(|_, (_, expires)| *expires > now);
        t.tokens.retain(|_, expires| *expires > now);
        Ok((before - t.sessions.len() - t.tokens.len()) as u64)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

/// Provider that authorizes every code as the same GitHub-like account.
#[derive(Default)]
pub struct FakeOAuth;

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn id(&self) -> &'static str {
        "github"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> anyhow::Result<String> {
        let query = serde_urlencoded::to_string([("redirect_uri", redirect_uri), ("state", state)])?;
        Ok(format!("https://provider.test/authorize?{query}"))
    }

    async fn exchange(&self, code: &str, _redirect_uri: &str) -> anyhow::Result<OAuthProfile> {
        Ok(OAuthProfile {
            provider_account_id: "42".into(),
            email: "octo@github.com".into(),
            name: Some("Octo".into()),
            access_token: format!("gho_{code}"),
            scope: Some("read:user".into()),
            token_type: Some("bearer".into()),
        })
    }
}
