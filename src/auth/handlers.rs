use axum::{
    extract::{FromRef, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    adapter::SessionUser,
    credentials::{authenticate, AuthError},
    dto::{EmailCallback, EmailSignIn, LoginInput, LoginState, OAuthCallback, SignInQuery},
    email,
    oauth::{self, StateKeys, STATE_COOKIE, STATE_TTL_SECS},
    services,
    session::{
        self, current_user, expired_cookie, read_cookie, safe_redirect, session_cookie,
        with_cookie, SESSION_COOKIE,
    },
};
use crate::{
    actions::{see_other, ActionResult},
    error::AppError,
    state::AppState,
    validation::{is_valid_email, RawForm},
};

const VERIFY_REQUEST_PATH: &str = "/login/verify-request";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

pub fn provider_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin/github", get(github_sign_in))
        .route("/api/auth/callback/github", get(github_callback))
        .route("/api/auth/signin/email", post(email_sign_in))
        .route("/api/auth/callback/email", get(email_callback))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/session", get(get_session))
}

fn login_failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(LoginState {
            message: message.into(),
        }),
    )
        .into_response()
}

fn signed_in(st: &AppState, session: &session::Session, to: &str) -> Response {
    with_cookie(see_other(to), &session_cookie(&st.config.auth, session))
}

#[instrument(skip(st, form))]
pub async fn login(State(st): State<AppState>, Form(form): Form<RawForm>) -> Result<Response, AppError> {
    let outcome = match LoginInput::parse(&form) {
        Ok(input) => authenticate(&st, &input)
            .await
            .map(|session| (session, input.redirect_to)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((session, redirect_to)) => {
            let to = safe_redirect(redirect_to.as_deref());
            Ok(signed_in(&st, &session, to))
        }
        Err(AuthError::Internal(e)) => Err(AppError::Internal(e)),
        Err(e) => {
            if let AuthError::Adapter(cause) = &e {
                error!(error = %cause, "sign-in failed after credential check");
            }
            let status = e.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Ok(login_failure(status, e.to_string()))
        }
    }
}

#[instrument(skip(st, form))]
pub async fn register(State(st): State<AppState>, Form(form): Form<RawForm>) -> ActionResult {
    services::register_user(&st, &form).await
}

#[instrument(skip(st))]
pub async fn github_sign_in(
    State(st): State<AppState>,
    Query(q): Query<SignInQuery>,
) -> Result<Response, AppError> {
    let Some(provider) = st.github.clone() else {
        return Err(AppError::NotFound);
    };
    let state_token = StateKeys::from_ref(&st).sign(q.callback_url.as_deref())?;
    let redirect_uri = oauth::callback_uri(&st.config.auth.base_url, provider.id());
    let url = provider.authorization_url(&redirect_uri, &state_token)?;

    let cookie = session::cookie(&st.config.auth, STATE_COOKIE, &state_token, STATE_TTL_SECS);
    Ok(with_cookie(see_other(&url), &cookie))
}

#[instrument(skip(st, headers, q))]
pub async fn github_callback(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    let Some(provider) = st.github.clone() else {
        return Err(AppError::NotFound);
    };
    let failed = || {
        with_cookie(
            see_other("/login?error=OAuthCallback"),
            &expired_cookie(&st.config.auth, STATE_COOKIE),
        )
    };

    if let Some(err) = q.error.as_deref() {
        warn!(error = %err, "provider returned an error");
        return Ok(failed());
    }
    let (Some(code), Some(state_param)) = (q.code.as_deref(), q.state.as_deref()) else {
        warn!("callback without code or state");
        return Ok(failed());
    };
    if read_cookie(&headers, STATE_COOKIE) != Some(state_param) {
        warn!("oauth state does not match cookie");
        return Ok(failed());
    }
    let claims = match StateKeys::from_ref(&st).verify(state_param) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "invalid oauth state");
            return Ok(failed());
        }
    };

    let redirect_uri = oauth::callback_uri(&st.config.auth.base_url, provider.id());
    let profile = match provider.exchange(code, &redirect_uri).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "oauth code exchange failed");
            return Ok(failed());
        }
    };
    let session = match oauth::complete_sign_in(&st, provider.id(), &profile).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "oauth sign-in failed");
            return Ok(failed());
        }
    };

    let to = safe_redirect(claims.callback.as_deref());
    let res = signed_in(&st, &session, to);
    Ok(with_cookie(res, &expired_cookie(&st.config.auth, STATE_COOKIE)))
}

#[instrument(skip(st, form))]
pub async fn email_sign_in(State(st): State<AppState>, Form(form): Form<EmailSignIn>) -> Response {
    let address = form.email.trim().to_lowercase();
    if !is_valid_email(&address) {
        return login_failure(StatusCode::BAD_REQUEST, AuthError::InvalidEmail.to_string());
    }
    match email::send_verification_request(&st, &address, form.callback_url.as_deref()).await {
        Ok(()) => see_other(VERIFY_REQUEST_PATH),
        Err(e) => {
            error!(error = %e, "send verification request failed");
            login_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::Adapter(e).to_string(),
            )
        }
    }
}

#[instrument(skip(st, q))]
pub async fn email_callback(
    State(st): State<AppState>,
    Query(q): Query<EmailCallback>,
) -> Result<Response, AppError> {
    let address = q.email.trim().to_lowercase();
    let Some(user) = email::verify_magic_link(&st, &address, &q.token).await? else {
        return Ok(see_other("/login?error=Verification"));
    };
    let session = session::start(&st, user.id).await?;
    info!(user_id = %user.id, "user signed in with email link");
    Ok(signed_in(&st, &session, safe_redirect(q.callback_url.as_deref())))
}

#[instrument(skip(st, headers))]
pub async fn sign_out(State(st): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = read_cookie(&headers, SESSION_COOKIE) {
        if let Err(e) = st.auth.delete_session(token).await {
            error!(error = %e, "delete session failed");
        }
    }
    with_cookie(see_other("/"), &expired_cookie(&st.config.auth, SESSION_COOKIE))
}

#[instrument(skip(st, headers))]
pub async fn get_session(
    State(st): State<AppState>,
    headers: HeaderMap,
) -> Json<Option<SessionUser>> {
    Json(current_user(&st, &headers).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::testing::{FakeOAuth, MemoryAdapter, MemoryUserStore};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(st: AppState) -> Router {
        auth_routes().merge(provider_routes()).with_state(st)
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn message(res: Response) -> String {
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let v: Value = serde_json::from_slice(&body).unwrap();
        v["message"].as_str().unwrap().to_string()
    }

    fn state_with_user() -> AppState {
        let users = Arc::new(MemoryUserStore::default());
        users.insert("User", "user@nextmail.com", &hash_password("123456").unwrap());
        AppState::fake()
            .with_users(users)
            .with_auth(Arc::new(MemoryAdapter::default()))
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let res = app(state_with_user())
            .oneshot(post_form(
                "/login",
                "email=user%40nextmail.com&password=123456&redirectTo=%2Fdashboard%2Finvoices",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/dashboard/invoices");
        let cookie = res.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("authjs.session-token="));
    }

    #[tokio::test]
    async fn login_messages_are_distinct() {
        let res = app(state_with_user())
            .oneshot(post_form("/login", "email=not-an-email&password=123456"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(res).await, "Invalid email format.");

        let res = app(state_with_user())
            .oneshot(post_form("/login", "email=ghost%40nextmail.com&password=123456"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(res).await, "Invalid credentials.");

        let users = Arc::new(MemoryUserStore::default());
        users.insert("User", "user@nextmail.com", &hash_password("123456").unwrap());
        let broken = AppState::fake()
            .with_users(users)
            .with_auth(Arc::new(MemoryAdapter::failing()));
        let res = app(broken)
            .oneshot(post_form("/login", "email=user%40nextmail.com&password=123456"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message(res).await, "Something went wrong.");
    }

    #[tokio::test]
    async fn register_redirects_to_login() {
        let res = app(AppState::fake())
            .oneshot(post_form(
                "/register",
                "username=Ada&email=ada%40example.com&password=Secur3P%40ss&confirmPassword=Secur3P%40ss",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/login");
    }

    #[tokio::test]
    async fn github_is_not_found_when_unconfigured() {
        let res = app(AppState::fake())
            .oneshot(Request::get("/api/auth/signin/github").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn github_flow_round_trips_state() {
        let adapter = Arc::new(MemoryAdapter::default());
        let st = AppState::fake()
            .with_auth(adapter.clone())
            .with_github(Arc::new(FakeOAuth::default()));

        let res = app(st.clone())
            .oneshot(
                Request::get("/api/auth/signin/github?callbackUrl=%2Fdashboard%2Fcustomers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let location = res.headers()["location"].to_str().unwrap().to_string();
        let state_token = location.split("state=").nth(1).unwrap().to_string();

        let res = app(st)
            .oneshot(
                Request::get(format!(
                    "/api/auth/callback/github?code=abc&state={state_token}"
                ))
                .header("cookie", format!("{STATE_COOKIE}={state_token}"))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/dashboard/customers");
        assert_eq!(adapter.session_count(), 1);
        assert_eq!(adapter.account_count(), 1);
    }

    #[tokio::test]
    async fn github_callback_rejects_mismatched_state() {
        let st = AppState::fake().with_github(Arc::new(FakeOAuth::default()));
        let token = StateKeys::from_ref(&st).sign(None).unwrap();
        let res = app(st)
            .oneshot(
                Request::get(format!("/api/auth/callback/github?code=abc&state={token}"))
                    .header("cookie", format!("{STATE_COOKIE}=something-else"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers()["location"], "/login?error=OAuthCallback");
    }

    #[tokio::test]
    async fn sign_out_deletes_session() {
        let adapter = Arc::new(MemoryAdapter::default());
        adapter.insert_session(
            "tok",
            SessionUser {
                id: uuid::Uuid::new_v4(),
                name: None,
                email: "user@nextmail.com".into(),
            },
        );
        let st = AppState::fake().with_auth(adapter.clone());
        let res = app(st)
            .oneshot(
                Request::post("/api/auth/signout")
                    .header("cookie", format!("{SESSION_COOKIE}=tok"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers()["location"], "/");
        assert!(res.headers()["set-cookie"]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        assert_eq!(adapter.session_count(), 0);
    }

    #[tokio::test]
    async fn session_endpoint_reports_anonymous_as_null() {
        let res = app(AppState::fake())
            .oneshot(Request::get("/api/auth/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"null");
    }
}
