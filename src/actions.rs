use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::validation::FieldErrors;

/// What a rejected form submission hands back to the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FormState {
    pub fn invalid(errors: FieldErrors, message: impl Into<String>) -> Self {
        Self {
            errors: Some(errors),
            message: Some(message.into()),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            errors: None,
            message: Some(message.into()),
        }
    }
}

/// Outcome of a form action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// Success: navigate to the given path.
    Redirect(String),
    /// Input failed validation; nothing was written.
    Invalid(FormState),
    /// The single write was attempted and failed.
    Failed(FormState),
}

impl ActionResult {
    pub fn redirect(path: impl Into<String>) -> Self {
        Self::Redirect(path.into())
    }
}

impl IntoResponse for ActionResult {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(to) => see_other(&to),
            Self::Invalid(state) => (StatusCode::UNPROCESSABLE_ENTITY, Json(state)).into_response(),
            Self::Failed(state) => (StatusCode::INTERNAL_SERVER_ERROR, Json(state)).into_response(),
        }
    }
}

/// 303 so the browser follows a form POST with a GET.
pub fn see_other(to: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, to.to_string())]).into_response()
}
