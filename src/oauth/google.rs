use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExternalIdentity, IdentityProvider};
use crate::{config::GoogleConfig, error::AppError};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<UserInfo> for ExternalIdentity {
    fn from(info: UserInfo) -> Self {
        Self {
            provider_id: info.sub,
            display_name: info.name.unwrap_or_default(),
            avatar_url: info.picture,
        }
    }
}

pub struct GoogleProvider {
    client: Client,
    config: GoogleConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, config })
    }
}

fn rejected() -> AppError {
    AppError::unauthorized("Google sign-in failed, please try again")
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid profile"),
                ("state", state),
            ],
        )
        .context("build authorize url")?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, AppError> {
        let res = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("google token request")?;
        if !res.status().is_success() {
            warn!(status = %res.status(), "google rejected authorization code");
            return Err(rejected());
        }
        let token: TokenResponse = res.json().await.context("decode google token")?;

        let res = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("google userinfo request")?;
        if !res.status().is_success() {
            warn!(status = %res.status(), "google userinfo failed");
            return Err(rejected());
        }
        let info: UserInfo = res.json().await.context("decode google userinfo")?;
        debug!(provider_id = %info.sub, "google identity resolved");
        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(
            GoogleConfig {
                client_id: "client-1".into(),
                client_secret: "shh".into(),
                callback_url: "http://localhost:3070/api/v1/auth/google/callback".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn authorize_url_carries_client_and_state() {
        let url = Url::parse(&provider().authorize_url("st4te").unwrap()).unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("client_id".into(), "client-1".into())));
        assert!(params.contains(&("state".into(), "st4te".into())));
        assert!(params.contains(&(
            "redirect_uri".into(),
            "http://localhost:3070/api/v1/auth/google/callback".into()
        )));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn userinfo_maps_to_identity() {
        let info: UserInfo = serde_json::from_value(serde_json::json!({
            "sub": "1234",
            "name": "Grace",
            "picture": "https://img/1.png"
        }))
        .unwrap();
        let identity = ExternalIdentity::from(info);
        assert_eq!(identity.provider_id, "1234");
        assert_eq!(identity.display_name, "Grace");
        assert_eq!(identity.avatar_url.as_deref(), Some("https://img/1.png"));
    }
}
