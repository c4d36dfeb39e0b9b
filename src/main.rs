use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use learnify_server::config::AppConfig;
use learnify_server::server::run_server;
use learnify_server::shared::state::AppState;
use learnify_server::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;
    let database_url = config.database_url();

    let pool = match create_conn(&database_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = run_migrations(&pool) {
        error!("Failed to run database migrations: {}", e);
        return Err(anyhow::anyhow!("database migrations failed: {}", e));
    }
    info!("Database migrations up to date");

    let app_state = Arc::new(AppState { conn: pool, config });

    info!(
        "Starting HTTP server on {}:{}",
        app_state.config.server.host, app_state.config.server.port
    );

    run_server(app_state).await?;
    Ok(())
}
