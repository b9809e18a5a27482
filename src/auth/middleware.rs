//! Request authorization chain.
//!
//! `protect` authenticates the caller and stores a [`CurrentUser`] in the
//! request extensions; `restrict` must run after it and stops the chain on
//! a role mismatch.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::cookies::{self, SESSION_COOKIE};
use crate::{
    error::AppError,
    state::AppState,
    users::{Role, Selection, User},
};

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access";

/// The authenticated account for this request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("User not authenticated. please log in"))
    }
}

/// Bearer token from `Authorization`; without that header, the session
/// cookie this service sets itself.
fn extract_token(headers: &HeaderMap) -> Result<&str, AppError> {
    match headers.get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized(NOT_LOGGED_IN)),
        None => cookies::read(headers, SESSION_COOKIE)
            .filter(|v| *v != "loggedout")
            .ok_or_else(|| AppError::unauthorized(NOT_LOGGED_IN)),
    }
}

pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let verified = state.tokens.verify(token)?;

    let user = match state.users.by_id(verified.subject_id, Selection::Public).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            warn!(user_id = %verified.subject_id, "token subject no longer exists");
            return Err(AppError::unauthorized(
                "The user with the given token does not exist",
            ));
        }
        Err(e) => return Err(e),
    };

    if user.password_changed_after(verified.issued_at) {
        debug!(user_id = %user.id, "token predates password change");
        return Err(AppError::unauthorized(
            "The password has been changed recently, please log in again",
        ));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Role gate; use after `protect`, e.g.
/// `middleware::from_fn(|req, next| restrict(Role::Admin, req, next))`.
pub async fn restrict(required: Role, req: Request, next: Next) -> Result<Response, AppError> {
    let Some(CurrentUser(user)) = req.extensions().get::<CurrentUser>() else {
        return Err(AppError::unauthorized("User not authenticated. please log in"));
    };
    if user.role != required {
        warn!(user_id = %user.id, role = %user.role, required = %required, "role check failed");
        return Err(AppError::Forbidden(
            "You do not have permission to perform this action".into(),
        ));
    }
    Ok(next.run(req).await)
}
