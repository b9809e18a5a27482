use axum::http::StatusCode;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::{
    dto::{LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
    password::{generate_reset_token, hash_reset_token, verify_password_or_decoy},
};
use crate::{
    error::AppError,
    state::AppState,
    users::{model::validate_new_password, Selection, User},
};

const BAD_CREDENTIALS: &str = "Incorrect email or password";

/// Account plus the freshly issued bearer token for it.
pub struct Session {
    pub token: String,
    pub user: User,
}

fn start_session(state: &AppState, user: User) -> Result<Session, AppError> {
    let token = state.tokens.issue(user.id)?;
    Ok(Session { token, user })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_new_password(password: Option<&str>, confirm: Option<&str>) -> Result<(), AppError> {
    let errors = validate_new_password(password, confirm);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<Session, AppError> {
    let user = state.users.create(req.into()).await?;
    info!(user_id = %user.id, "user signed up");
    start_session(state, user)
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<Session, AppError> {
    let (Some(email), Some(password)) = (
        req.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "please provide email and password for logging in!".into(),
        ));
    };

    let user = match state.users.by_email(&email, Selection::WithSecrets).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            // Same argon2 cost as a real mismatch.
            verify_password_or_decoy(&password, None)?;
            warn!("login unknown email");
            return Err(AppError::unauthorized(BAD_CREDENTIALS));
        }
        Err(e) => return Err(e),
    };

    // Provider-only accounts have no hash and cannot log in with a password.
    if !verify_password_or_decoy(&password, user.password_hash.as_deref())? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }

    info!(user_id = %user.id, "user logged in");
    start_session(state, user)
}

/// Stores a fresh reset ticket and mails the raw token. Returns the
/// user-facing confirmation message.
pub async fn forgot_password(state: &AppState, email: Option<String>) -> Result<String, AppError> {
    let email = email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Please provide your email address".into()))?;

    let mut user = match state.users.by_email(&email, Selection::WithSecrets).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::NotFound(
                "We could not find the user with the given email".into(),
            ))
        }
        Err(e) => return Err(e),
    };

    let ticket = generate_reset_token(OffsetDateTime::now_utc());
    user.password_reset_token = Some(ticket.token_hash);
    user.password_reset_token_expire = Some(ticket.expires_at);
    state.users.save(&user).await?;

    let link = format!(
        "{}/api/v1/auth/reset-password/{}",
        state.config.public_url.trim_end_matches('/'),
        ticket.raw_token
    );
    let body = format!(
        "We have received a password reset request. Please use the link below to reset your password\n\n{link}\n\nThis reset password link will be valid only for 10 minutes."
    );

    let delivery = tokio::time::timeout(
        state.config.outbound_timeout(),
        state
            .mailer
            .send_email(&email, "Password change request received", &body),
    )
    .await
    .map_err(|_| anyhow::anyhow!("mail delivery timed out"))
    .and_then(|sent| sent);

    if let Err(e) = delivery {
        error!(user_id = %user.id, error = %e, "reset email delivery failed");
        user.clear_reset_ticket();
        state.users.save(&user).await?;
        return Err(AppError::Operational {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "There was an error sending password reset email. Please try again later"
                .into(),
        });
    }

    info!(user_id = %user.id, "password reset ticket issued");
    Ok("password reset link sent to the user email".into())
}

/// Consumes a reset ticket: the raw token must hash to a stored, unexpired
/// ticket. Earlier tokens stop working through `password_changed_at`.
pub async fn reset_password(
    state: &AppState,
    raw_token: &str,
    req: ResetPasswordRequest,
) -> Result<Session, AppError> {
    let invalid = || AppError::BadRequest("Token is invalid or has expired".into());
    let now = OffsetDateTime::now_utc();

    let mut user = match state.users.by_reset_token(&hash_reset_token(raw_token)).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e),
    };
    if !user.password_reset_token_expire.is_some_and(|expire| expire > now) {
        warn!(user_id = %user.id, "expired reset ticket presented");
        return Err(invalid());
    }

    check_new_password(req.password.as_deref(), req.confirm_password.as_deref())?;
    let password = req.password.unwrap_or_default();
    user.set_password(&password, now)?;
    user.clear_reset_ticket();
    state.users.save(&user).await?;

    info!(user_id = %user.id, "password reset");
    start_session(state, user)
}

pub async fn update_password(
    state: &AppState,
    current: &User,
    req: UpdatePasswordRequest,
) -> Result<Session, AppError> {
    let mut user = state.users.by_id(current.id, Selection::WithSecrets).await?;

    let current_password = req.current_password.unwrap_or_default();
    if !verify_password_or_decoy(&current_password, user.password_hash.as_deref())? {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(AppError::unauthorized(
            "The current password you provided is wrong",
        ));
    }

    check_new_password(req.password.as_deref(), req.confirm_password.as_deref())?;
    let password = req.password.unwrap_or_default();
    user.set_password(&password, OffsetDateTime::now_utc())?;
    state.users.save(&user).await?;

    info!(user_id = %user.id, "password updated");
    start_session(state, user)
}
