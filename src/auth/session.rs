use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::adapter::SessionUser;
use crate::config::AuthConfig;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "authjs.session-token";

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub expires: OffsetDateTime,
}

/// 256 random bits, hex encoded.
pub fn new_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Drops expired sessions and verification tokens. Failures are only logged.
pub async fn prune_expired(st: &AppState) {
    match st.auth.delete_expired().await {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "expired auth rows pruned"),
        Err(e) => warn!(error = %e, "pruning expired auth rows failed"),
    }
}

/// Persists a new database session for `user_id`.
pub async fn start(st: &AppState, user_id: Uuid) -> anyhow::Result<Session> {
    prune_expired(st).await;
    let session = Session {
        token: new_token(),
        expires: OffsetDateTime::now_utc() + Duration::days(st.config.auth.session_max_age_days),
    };
    st.auth
        .create_session(&session.token, user_id, session.expires)
        .await?;
    debug!(%user_id, "session started");
    Ok(session)
}

pub fn cookie(cfg: &AuthConfig, name: &str, value: &str, max_age_secs: i64) -> String {
    let mut c = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if cfg.secure_cookies() {
        c.push_str("; Secure");
    }
    c
}

pub fn session_cookie(cfg: &AuthConfig, session: &Session) -> String {
    let max_age = (session.expires - OffsetDateTime::now_utc()).whole_seconds().max(0);
    cookie(cfg, SESSION_COOKIE, &session.token, max_age)
}

pub fn expired_cookie(cfg: &AuthConfig, name: &str) -> String {
    cookie(cfg, name, "", 0)
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

pub fn with_cookie(mut res: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(v) => {
            res.headers_mut().append(header::SET_COOKIE, v);
        }
        Err(e) => warn!(error = %e, "unencodable cookie dropped"),
    }
    res
}

/// Resolves the session cookie. Lookup failures count as signed out.
pub async fn current_user(st: &AppState, headers: &HeaderMap) -> Option<SessionUser> {
    let token = read_cookie(headers, SESSION_COOKIE)?;
    match st.auth.get_session_user(token).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "session lookup failed");
            None
        }
    }
}

/// Only same-site absolute paths are followed after sign-in.
pub fn safe_redirect(target: Option<&str>) -> &str {
    match target {
        Some(t) if t.starts_with('/') && !t.starts_with("//") && !t.starts_with("/\\") => t,
        _ => "/dashboard",
    }
}

/// The signed-in user, placed in request extensions by the route guard.
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or((StatusCode::UNAUTHORIZED, "Not signed in".to_string()))
    }
}
