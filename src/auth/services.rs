use tracing::{debug, error, info, instrument};

use super::dto::RegisterInput;
use super::password::hash_password;
use super::repo::NewUser;
use crate::actions::{ActionResult, FormState};
use crate::state::AppState;
use crate::validation::RawForm;

pub const LOGIN_PATH: &str = "/login";

#[instrument(skip(st, form))]
pub async fn register_user(st: &AppState, form: &RawForm) -> ActionResult {
    let input = match RegisterInput::validate(form) {
        Ok(input) => input,
        Err(errors) => {
            debug!(?errors, "registration rejected");
            return ActionResult::Invalid(FormState::invalid(
                errors,
                "Missing or invalid fields. Failed to register.",
            ));
        }
    };

    let hash = match hash_password(&input.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return ActionResult::Failed(FormState::message(
                "Database Error: Failed to Register User.",
            ));
        }
    };

    let new_user = NewUser {
        name: &input.name,
        email: &input.email,
        password_hash: &hash,
    };
    if let Err(e) = st.users.create(&new_user).await {
        error!(error = %e, email = %input.email, "create user failed");
        return ActionResult::Failed(FormState::message(
            "Database Error: Failed to Register User.",
        ));
    }

    info!(email = %input.email, "user registered");
    ActionResult::redirect(LOGIN_PATH)
}
