use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub base_url: String,
    pub session_max_age_days: i64,
}

impl AuthConfig {
    /// Session cookies carry `Secure` only when served over https.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub from: String,
    pub resend_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth_database_url: String,
    pub auth: AuthConfig,
    pub github: Option<GithubConfig>,
    pub email: EmailConfig,
}

const DEFAULT_SESSION_DAYS: i64 = 30;
const MAX_SESSION_DAYS: i64 = 365;

/// Session lifetime in days, kept within `1..=MAX_SESSION_DAYS`.
fn session_max_age_days(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map_or(DEFAULT_SESSION_DAYS, |days| days.clamp(1, MAX_SESSION_DAYS))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let auth_database_url =
            std::env::var("AUTH_DATABASE_URL").unwrap_or_else(|_| database_url.clone());
        let auth = AuthConfig {
            secret: std::env::var("AUTH_SECRET")?,
            base_url: std::env::var("AUTH_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            session_max_age_days: session_max_age_days(
                std::env::var("AUTH_SESSION_MAX_AGE_DAYS").ok().as_deref(),
            ),
        };
        let github = match (
            std::env::var("AUTH_GITHUB_ID"),
            std::env::var("AUTH_GITHUB_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(GithubConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let email = EmailConfig {
            from: std::env::var("AUTH_EMAIL_FROM")
                .unwrap_or_else(|_| "Acme <onboarding@resend.dev>".into()),
            resend_api_key: std::env::var("AUTH_RESEND_KEY").ok(),
        };
        Ok(Self {
            database_url,
            auth_database_url,
            auth,
            github,
            email,
        })
    }
}
