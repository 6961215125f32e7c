use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use super::adapter::SessionUser;
use super::session::{self, new_token};
use crate::state::AppState;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Development mailer: the link goes to the log instead of an inbox.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, body = %message.text, "email not sent (no provider configured)");
        Ok(())
    }
}

/// Delivers through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
}

impl ResendMailer {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .context("resend request")?
            .error_for_status()
            .context("resend response")?;
        Ok(())
    }
}

/// Tokens are stored hashed with the server secret, never in the clear.
pub fn hash_token(token: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn magic_link_url(
    base_url: &str,
    token: &str,
    email: &str,
    callback_url: Option<&str>,
) -> anyhow::Result<String> {
    let mut params = vec![("token", token), ("email", email)];
    if let Some(cb) = callback_url {
        params.push(("callbackUrl", cb));
    }
    let query = serde_urlencoded::to_string(&params)?;
    Ok(format!("{base_url}/api/auth/callback/email?{query}"))
}

fn sign_in_message(from: &str, to: &str, url: &str, host: &str) -> EmailMessage {
    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Sign in to {host}"),
        text: format!("Sign in to {host}\n{url}\n\n"),
        html: format!(
            r#"<p>Sign in to <strong>{host}</strong></p><p><a href="{url}">Sign in</a></p><p>If you did not request this email you can safely ignore it.</p>"#
        ),
    }
}

fn host_of(base_url: &str) -> &str {
    base_url
        .split_once("://")
        .map_or(base_url, |(_, rest)| rest)
}

/// Stores a one-time token for `email` and mails the sign-in link.
#[instrument(skip(st))]
pub async fn send_verification_request(
    st: &AppState,
    email: &str,
    callback_url: Option<&str>,
) -> anyhow::Result<()> {
    let cfg = &st.config.auth;
    session::prune_expired(st).await;
    let token = new_token();
    let expires = OffsetDateTime::now_utc() + Duration::hours(TOKEN_TTL_HOURS);
    st.auth
        .create_verification_token(email, &hash_token(&token, &cfg.secret), expires)
        .await
        .context("store verification token")?;

    let url = magic_link_url(&cfg.base_url, &token, email, callback_url)?;
    let message = sign_in_message(&st.config.email.from, email, &url, host_of(&cfg.base_url));
    st.mailer.send(&message).await.context("send sign-in email")?;
    info!(%email, "sign-in link sent");
    Ok(())
}

/// `Ok(None)` when the link is unknown, already used or expired.
#[instrument(skip(st, token))]
pub async fn verify_magic_link(
    st: &AppState,
    email: &str,
    token: &str,
) -> anyhow::Result<Option<SessionUser>> {
    let hashed = hash_token(token, &st.config.auth.secret);
    let Some(expires) = st.auth.use_verification_token(email, &hashed).await? else {
        warn!("unknown or used verification token");
        return Ok(None);
    };
    if expires <= OffsetDateTime::now_utc() {
        warn!("expired verification token");
        return Ok(None);
    }
    let user = st.auth.upsert_user(email, None).await?;
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAdapter, RecordingMailer};
    use std::sync::Arc;

    #[test]
    fn token_hash_depends_on_secret() {
        let a = hash_token("tok", "secret-a");
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_token("tok", "secret-a"));
        assert_ne!(a, hash_token("tok", "secret-b"));
    }

    #[test]
    fn link_carries_encoded_params() {
        let url = magic_link_url(
            "http://localhost:8080",
            "abc",
            "a+b@x.com",
            Some("/dashboard/invoices"),
        )
        .unwrap();
        assert_eq!(
            url,
            "http://localhost:8080/api/auth/callback/email?token=abc&email=a%2Bb%40x.com&callbackUrl=%2Fdashboard%2Finvoices"
        );
    }

    #[test]
    fn host_strips_scheme() {
        assert_eq!(host_of("https://acme.dev"), "acme.dev");
        assert_eq!(host_of("localhost:8080"), "localhost:8080");
    }

    #[tokio::test]
    async fn link_signs_in_once() {
        let adapter = Arc::new(MemoryAdapter::default());
        let mailer = Arc::new(RecordingMailer::default());
        let st = AppState::fake()
            .with_auth(adapter.clone())
            .with_mailer(mailer.clone());

        send_verification_request(&st, "ada@example.com", None)
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");

        let token = sent[0]
            .text
            .split("token=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .to_string();

        let user = verify_magic_link(&st, "ada@example.com", &token)
            .await
            .unwrap()
            .expect("first use signs in");
        assert_eq!(user.email, "ada@example.com");

        let again = verify_magic_link(&st, "ada@example.com", &token)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let adapter = Arc::new(MemoryAdapter::default());
        let st = AppState::fake().with_auth(adapter);
        send_verification_request(&st, "ada@example.com", None)
            .await
            .unwrap();
        assert!(verify_magic_link(&st, "ada@example.com", "guess")
            .await
            .unwrap()
            .is_none());
    }
}
