use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use campus_booking::config::AppConfig;
use campus_booking::db;
use campus_booking::handlers;
use campus_booking::services::{auth, sessions};
use campus_booking::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.session_secret == "changeme" {
        tracing::warn!("SESSION_SECRET is not set; using the insecure default");
    }

    let conn = db::init_db(&config.database_url)?;
    auth::seed_admin(&conn, &config, Utc::now().naive_utc())?;

    let state = Arc::new(AppState::new(conn, config.clone()));
    let sweeper = sessions::spawn_session_sweeper(state.clone());

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}
