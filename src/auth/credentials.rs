use axum::http::StatusCode;
use tracing::{info, instrument, warn};

use super::adapter::{NewAccount, SessionUser, CREDENTIALS_PROVIDER};
use super::dto::LoginInput;
use super::password::verify_password;
use super::repo::{User, UserStore};
use super::session::{self, Session};
use crate::state::AppState;

/// Why a credential sign-in did not produce a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email format.")]
    InvalidEmail,
    #[error("Invalid credentials.")]
    InvalidCredentials,
    /// Credentials checked out but the adapter could not finish the sign-in.
    #[error("Something went wrong.")]
    Adapter(anyhow::Error),
    /// Anything unrecognized; re-raised to the caller.
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AuthError {
    /// Status for the user-facing variants. `Internal` has none.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AuthError::InvalidEmail => Some(StatusCode::BAD_REQUEST),
            AuthError::InvalidCredentials => Some(StatusCode::UNAUTHORIZED),
            AuthError::Adapter(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            AuthError::Internal(_) => None,
        }
    }
}

/// User lookup for the credentials provider. A failing lookup reads as
/// "no such user".
pub async fn lookup_user(users: &dyn UserStore, email: &str) -> Option<User> {
    match users.find_by_email(email).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, %email, "failed to fetch user");
            None
        }
    }
}

/// Adapter identity for a password user, reached through a `credentials`
/// account keyed by the user id. A first sign-in may only claim an address
/// that no provider has proven yet.
async fn credential_identity(st: &AppState, user: &User) -> Result<SessionUser, AuthError> {
    let account_id = user.id.to_string();
    if let Some(identity) = st
        .auth
        .get_user_by_account(CREDENTIALS_PROVIDER, &account_id)
        .await
        .map_err(AuthError::Adapter)?
    {
        return Ok(identity);
    }

    let Some(identity) = st
        .auth
        .claim_unverified_user(&user.email, Some(&user.name))
        .await
        .map_err(AuthError::Adapter)?
    else {
        warn!(user_id = %user.id, "email already owned by a verified sign-in");
        return Err(AuthError::InvalidCredentials);
    };

    let account = NewAccount {
        provider: CREDENTIALS_PROVIDER,
        provider_account_id: &account_id,
        access_token: None,
        scope: None,
        token_type: None,
    };
    st.auth
        .link_account(identity.id, &account)
        .await
        .map_err(AuthError::Adapter)?;
    Ok(identity)
}

#[instrument(skip(st, input), fields(email = %input.email))]
pub async fn authenticate(st: &AppState, input: &LoginInput) -> Result<Session, AuthError> {
    let Some(user) = lookup_user(st.users.as_ref(), &input.email).await else {
        warn!("sign-in with unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(&input.password, &user.password).map_err(AuthError::Internal)? {
        warn!(user_id = %user.id, "sign-in with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let identity = credential_identity(st, &user).await?;
    let session = session::start(st, identity.id)
        .await
        .map_err(AuthError::Adapter)?;

    info!(user_id = %user.id, "user signed in with credentials");
    Ok(session)
}
