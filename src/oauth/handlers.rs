use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect},
};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use time::Duration;
use tracing::{info, instrument, warn};

use super::bridge::resolve_external_identity;
use crate::{
    auth::cookies::{self, OAUTH_STATE_COOKIE, SESSION_COOKIE},
    error::AppError,
    state::AppState,
};

const STATE_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn new_state() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sends the browser to the provider's consent screen.
#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let csrf = new_state();
    let url = state.identity.authorize_url(&csrf)?;
    let cookie = cookies::build(
        OAUTH_STATE_COOKIE,
        &csrf,
        STATE_TTL,
        state.config.environment.is_production(),
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to(&url),
    ))
}

#[instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, AppError> {
    let failed = || AppError::unauthorized("Google sign-in failed, please try again");

    if let Some(error) = params.error.as_deref() {
        warn!(error, "provider returned an error");
        return Err(failed());
    }
    let expected = cookies::read(&headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != params.state.as_deref() {
        warn!("oauth state mismatch");
        return Err(failed());
    }
    let code = params.code.as_deref().filter(|c| !c.is_empty()).ok_or_else(failed)?;

    let identity = state.identity.exchange(code).await?;
    let user = resolve_external_identity(&state.users, identity).await?;
    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, "external login");

    let secure = state.config.environment.is_production();
    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                cookies::build(SESSION_COOKIE, &token, state.tokens.ttl(), secure),
            ),
            (header::SET_COOKIE, cookies::expired(OAUTH_STATE_COOKIE, secure)),
        ]),
        Redirect::to("/profile"),
    ))
}
