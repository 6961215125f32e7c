use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::credentials::AuthError;
use crate::validation::{is_valid_email, FieldErrors, RawForm, Validator};

lazy_static! {
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref LOWERCASE: Regex = Regex::new(r"[a-z]").unwrap();
    static ref DIGIT: Regex = Regex::new(r"[0-9]").unwrap();
    static ref SPECIAL: Regex = Regex::new(r"[^A-Za-z0-9]").unwrap();
}

/// Validated registration form.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    /// Fields `username`, `email`, `password`, `confirmPassword`.
    pub fn validate(form: &RawForm) -> Result<Self, FieldErrors> {
        let mut v = Validator::new(form);

        let raw_name = v.raw("username").unwrap_or("").trim();
        let name = v.length(
            "username",
            raw_name,
            2,
            50,
            "Username must be at least 2 characters.",
            "Username must be at most 50 characters.",
        );
        let email = v.email("email", "Please enter a valid email address.");

        let raw_password = v.raw("password").unwrap_or("");
        let sized = v.length(
            "password",
            raw_password,
            8,
            64,
            "Password must be at least 8 characters.",
            "Password must be at most 64 characters.",
        );
        let classes = v.patterns(
            "password",
            Some(raw_password),
            &[
                (&UPPERCASE, "Password must contain at least one uppercase letter."),
                (&LOWERCASE, "Password must contain at least one lowercase letter."),
                (&DIGIT, "Password must contain at least one number."),
                (&SPECIAL, "Password must contain at least one special character."),
            ],
        );
        let password = sized.and(classes);

        v.same_as("confirmPassword", "password", "Passwords do not match.");

        let input = name
            .zip(email)
            .zip(password)
            .map(|((name, email), password)| RegisterInput {
                name: name.to_string(),
                email: email.to_lowercase(),
                password: password.to_string(),
            });
        v.finish(input)
    }
}

/// Credentials submitted to the sign-in form.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub redirect_to: Option<String>,
}

impl LoginInput {
    pub fn parse(form: &RawForm) -> Result<Self, AuthError> {
        let email = form
            .get("email")
            .map(|e| e.trim().to_lowercase())
            .unwrap_or_default();
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        let password = form.get("password").cloned().unwrap_or_default();
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Self {
            email,
            password,
            redirect_to: form.get("redirectTo").cloned(),
        })
    }
}

/// Body of a failed sign-in.
#[derive(Debug, Serialize)]
pub struct LoginState {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailSignIn {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailCallback {
    pub token: String,
    pub email: String,
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
