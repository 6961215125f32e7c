use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::session::current_user;
use crate::actions::see_other;
use crate::state::AppState;

pub const PROTECTED_PREFIX: &str = "/dashboard";
pub const SIGN_IN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
    RedirectTo(&'static str),
}

/// Paths the guard looks at: everything but the auth API and images.
pub fn is_guarded(path: &str) -> bool {
    !(path == "/api" || path.starts_with("/api/") || path.ends_with(".png"))
}

pub fn is_protected(path: &str) -> bool {
    path == PROTECTED_PREFIX
        || path
            .strip_prefix(PROTECTED_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Dashboard pages need a session; a signed-in user hitting any other page
/// is sent to the dashboard.
pub fn authorize(path: &str, logged_in: bool) -> Access {
    if is_protected(path) {
        if logged_in {
            Access::Allow
        } else {
            Access::Deny
        }
    } else if logged_in {
        Access::RedirectTo(PROTECTED_PREFIX)
    } else {
        Access::Allow
    }
}

pub fn sign_in_url(callback: &str) -> String {
    match serde_urlencoded::to_string([("callbackUrl", callback)]) {
        Ok(query) => format!("{SIGN_IN_PATH}?{query}"),
        Err(_) => SIGN_IN_PATH.to_string(),
    }
}

pub async fn require_session(State(st): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if !is_guarded(&path) {
        return next.run(req).await;
    }

    let user = current_user(&st, req.headers()).await;
    match authorize(&path, user.is_some()) {
        Access::Allow => {
            if let Some(user) = user {
                req.extensions_mut().insert(user);
            }
            next.run(req).await
        }
        Access::Deny => {
            warn!(%path, "unauthenticated request denied");
            see_other(&sign_in_url(&path))
        }
        Access::RedirectTo(to) => {
            debug!(%path, to, "signed-in user redirected");
            see_other(to)
        }
    }
}
