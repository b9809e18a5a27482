use async_trait::async_trait;
use axum::{routing::get, Router};

use crate::{error::AppError, state::AppState};

pub mod bridge;
pub mod google;
pub mod handlers;

/// Identity asserted by an external provider after its own login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Redirect-based login handshake with an external provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent-screen URL carrying the anti-forgery `state`.
    fn authorize_url(&self, state: &str) -> Result<String, AppError>;

    /// Trades the callback `code` for the identity it vouches for.
    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, AppError>;
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(handlers::google_login))
        .route("/auth/google/callback", get(handlers::google_callback))
}
