mod app;
mod auth;
mod config;
mod error;
mod mail;
mod oauth;
mod state;
mod users;

#[cfg(test)]
mod app_tests;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accountd=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = match state::AppState::init().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = ?e, "startup failed");
            return Err(e);
        }
    };
    tracing::info!(environment = ?app_state.config.environment, "configuration loaded");

    let host = app_state.config.host.clone();
    let port = app_state.config.port;
    let router = app::build_app(app_state);

    if let Err(e) = app::serve(router, &host, port).await {
        tracing::error!(error = ?e, "server terminated");
        return Err(e);
    }
    Ok(())
}
