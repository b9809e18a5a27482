use crate::state::AppState;
use axum::Router;

pub(crate) mod claims;
pub mod cookies;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod services;

pub use dto::PublicUser;

pub fn router(state: AppState) -> Router<AppState> {
    handlers::auth_routes(state)
}
