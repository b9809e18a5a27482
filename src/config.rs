use std::time::Duration;

use anyhow::Context;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// Blank means production; anything unrecognised is a startup error
    /// rather than a silent switch to verbose errors and insecure cookies.
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => anyhow::bail!("APP_ENV must be development or production, got {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub starttls: bool,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// Base URL used when building links sent by email.
    pub public_url: String,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub google: GoogleConfig,
    pub outbound_timeout_secs: u64,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::parse(&var_or("APP_ENV", "production"))?;
        let port = parsed_or("APP_PORT", 3070u16);
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: var_or("JWT_ISSUER", "accountd"),
            audience: var_or("JWT_AUDIENCE", "accountd-users"),
            ttl_minutes: parsed_or("JWT_TTL_MINUTES", 60),
        };

        let mail = MailConfig {
            host: var_or("EMAIL_HOST", "localhost"),
            port: parsed_or("EMAIL_PORT", 2525),
            username: var_or("EMAIL_USER", ""),
            password: var_or("EMAIL_PASSWORD", ""),
            from: var_or("EMAIL_FROM", "Accounts Support <support@localhost>"),
            starttls: parsed_or("EMAIL_STARTTLS", true),
        };

        let google = GoogleConfig {
            client_id: var_or("GOOGLE_CLIENT_ID", ""),
            client_secret: var_or("GOOGLE_CLIENT_SECRET", ""),
            callback_url: var_or(
                "GOOGLE_CALLBACK_URL",
                &format!("http://localhost:{port}/api/v1/auth/google/callback"),
            ),
        };

        Ok(Self {
            environment,
            host: var_or("APP_HOST", "0.0.0.0"),
            port,
            public_url: var_or("APP_PUBLIC_URL", &format!("http://localhost:{port}")),
            database_url,
            jwt,
            mail,
            google,
            outbound_timeout_secs: parsed_or("OUTBOUND_TIMEOUT_SECS", 10),
        })
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }
}
