use crate::state::AppState;
use axum::Router;

pub mod adapter;
pub mod credentials;
pub mod dto;
pub mod email;
pub mod guard;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod repo;
pub mod services;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::auth_routes().merge(handlers::provider_routes())
}
