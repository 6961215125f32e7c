use anyhow::Context;
use async_trait::async_trait;
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument};

use super::adapter::NewAccount;
use super::session::{self, new_token, Session};
use crate::config::GithubConfig;
use crate::state::AppState;

pub const STATE_COOKIE: &str = "authjs.oauth-state";
pub const STATE_TTL_SECS: i64 = 10 * 60;
const STATE_ISSUER: &str = "acme-dashboard";
const STATE_AUDIENCE: &str = "oauth-state";

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "acme-dashboard";

/// What a provider tells us about the person who just authorized.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub access_token: String,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn id(&self) -> &'static str;
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> anyhow::Result<String>;
    /// Trades the authorization code for a token and loads the profile.
    async fn exchange(&self, code: &str, redirect_uri: &str) -> anyhow::Result<OAuthProfile>;
}

pub struct GithubProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GithubProvider {
    pub fn new(client: reqwest::Client, cfg: &GithubConfig) -> Self {
        Self {
            client,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubToken {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn pick_email(emails: Vec<GithubEmail>) -> Option<String> {
    let mut verified = emails.into_iter().filter(|e| e.verified);
    let first = verified.next()?;
    if first.primary {
        return Some(first.email);
    }
    Some(
        verified
            .find(|e| e.primary)
            .map_or(first.email, |e| e.email),
    )
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn id(&self) -> &'static str {
        "github"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> anyhow::Result<String> {
        let query = serde_urlencoded::to_string([
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", "read:user user:email"),
            ("state", state),
        ])?;
        Ok(format!("{GITHUB_AUTHORIZE_URL}?{query}"))
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> anyhow::Result<OAuthProfile> {
        let token: GithubToken = self
            .client
            .post(GITHUB_TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .context("github token request")?
            .error_for_status()
            .context("github token response")?
            .json()
            .await
            .context("github token body")?;

        let access_token = match (token.access_token, token.error) {
            (Some(t), _) => t,
            (None, err) => anyhow::bail!(
                "github token exchange failed: {} {}",
                err.unwrap_or_default(),
                token.error_description.unwrap_or_default()
            ),
        };

        let user: GithubUser = self
            .client
            .get(format!("{GITHUB_API_URL}/user"))
            .bearer_auth(&access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .context("github user request")?
            .error_for_status()
            .context("github user response")?
            .json()
            .await
            .context("github user body")?;

        let email = match user.email {
            Some(e) => e,
            None => {
                let emails: Vec<GithubEmail> = self
                    .client
                    .get(format!("{GITHUB_API_URL}/user/emails"))
                    .bearer_auth(&access_token)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .send()
                    .await
                    .context("github emails request")?
                    .error_for_status()
                    .context("github emails response")?
                    .json()
                    .await
                    .context("github emails body")?;
                pick_email(emails).context("github account has no verified email")?
            }
        };

        debug!(login = %user.login, "github profile loaded");
        Ok(OAuthProfile {
            provider_account_id: user.id.to_string(),
            email: email.to_lowercase(),
            name: user.name.or(Some(user.login)),
            access_token,
            scope: token.scope,
            token_type: token.token_type,
        })
    }
}

/// Claims of the signed `state` parameter that ties a callback to the
/// browser that started the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub nonce: String,
    pub callback: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct StateKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl FromRef<AppState> for StateKeys {
    fn from_ref(state: &AppState) -> Self {
        let secret = state.config.auth.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl StateKeys {
    pub fn sign(&self, callback: Option<&str>) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::seconds(STATE_TTL_SECS);
        let claims = StateClaims {
            nonce: new_token(),
            callback: callback.map(str::to_string),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: STATE_ISSUER.into(),
            aud: STATE_AUDIENCE.into(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<StateClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[STATE_AUDIENCE]);
        validation.set_issuer(&[STATE_ISSUER]);
        let data = decode::<StateClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

pub fn callback_uri(base_url: &str, provider: &str) -> String {
    format!("{base_url}/api/auth/callback/{provider}")
}

/// Finds or creates the adapter user behind `profile` and opens a session.
#[instrument(skip(st, profile), fields(email = %profile.email))]
pub async fn complete_sign_in(
    st: &AppState,
    provider: &str,
    profile: &OAuthProfile,
) -> anyhow::Result<Session> {
    let user = match st
        .auth
        .get_user_by_account(provider, &profile.provider_account_id)
        .await?
    {
        Some(user) => user,
        None => {
            let user = st
                .auth
                .upsert_user(&profile.email, profile.name.as_deref())
                .await?;
            st.auth
                .link_account(
                    user.id,
                    &NewAccount {
                        provider,
                        provider_account_id: &profile.provider_account_id,
                        access_token: Some(&profile.access_token),
                        scope: profile.scope.as_deref(),
                        token_type: profile.token_type.as_deref(),
                    },
                )
                .await?;
            info!(user_id = %user.id, "account linked");
            user
        }
    };
    session::start(st, user.id).await
}
