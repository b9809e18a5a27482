use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{Role, Selection};
use crate::{
    auth::{
        middleware::{restrict, CurrentUser},
        PublicUser,
    },
    error::AppError,
    state::AppState,
};

/// Routes that additionally require the admin role. Must sit behind
/// `protect`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(get_user))
        .route_layer(middleware::from_fn(|req, next| {
            restrict(Role::Admin, req, next)
        }))
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub data: UserBody,
}

impl UserResponse {
    fn of(user: &super::User) -> Json<Self> {
        Json(Self {
            status: "success",
            data: UserBody { user: user.into() },
        })
    }
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    UserResponse::of(&user)
}

/// Profile of the signed-in account; reached by browser sessions through
/// the `jwt` cookie as well as by bearer tokens.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn profile(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    UserResponse::of(&user)
}

/// Soft delete: the account drops out of every lookup, so its tokens stop
/// resolving too.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn deactivate_me(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
) -> Result<StatusCode, AppError> {
    user.active = false;
    state.users.save(&user).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::InvalidId {
        path: "id",
        value: id.clone(),
    })?;
    let user = state.users.by_id(id, Selection::Public).await?;
    Ok(UserResponse::of(&user))
}
