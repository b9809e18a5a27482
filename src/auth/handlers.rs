use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    cookies::{self, SESSION_COOKIE},
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest,
        SignupRequest, UpdatePasswordRequest,
    },
    middleware::{protect, CurrentUser},
    services::{self, Session},
};
use crate::{
    error::{AppError, JsonBody},
    state::AppState,
};

pub fn auth_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/update-password", patch(update_password))
        .route_layer(middleware::from_fn_with_state(state, protect));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", patch(reset_password))
        .merge(protected)
}

/// Token in the body and in the `jwt` session cookie.
pub(crate) fn session_response(state: &AppState, status: StatusCode, session: Session) -> Response {
    let cookie = cookies::build(
        SESSION_COOKIE,
        &session.token,
        state.tokens.ttl(),
        state.config.environment.is_production(),
    );
    (
        status,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse::new(session.token, &session.user)),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<Response, AppError> {
    let session = services::signup(&state, payload).await?;
    Ok(session_response(&state, StatusCode::CREATED, session))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let session = services::login(&state, payload).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = cookies::expired(SESSION_COOKIE, state.config.environment.is_production());
    (AppendHeaders([(header::SET_COOKIE, cookie)]), Redirect::to("/"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = services::forgot_password(&state, payload.email).await?;
    Ok(Json(MessageResponse::success(message)))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let session = services::reset_password(&state, &token, payload).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    let session = services::update_password(&state, &user, payload).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}
