use std::sync::Arc;

mod app;
mod auth;
mod config;
mod db;
mod error;
#[cfg(test)]
mod memory_store;
mod news;
mod pagination;
mod state;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "newsfeed=debug,axum=info,tower_http=info".to_string());
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

    let config = Arc::new(config::AppConfig::from_env()?);
    tracing::info!(app = %config.app_name, version = %config.app_version, "starting");

    let db = db::connect(&config).await?;
    db::migrate(&db).await?;

    let state = state::AppState::init(db, config)?;
    let app = app::build_app(state);
    app::serve(app).await
}
