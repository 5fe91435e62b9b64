use anyhow::Result;
use auth::jwt::{JwtConfig, JwtService};
use auth::mailer::{Mailer, MailerConfig};
use auth::repositories::user::hash_password;
use common::database::{DatabaseConfig, health_check, init_pool};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod billing;
mod config;
mod error;
mod models;
mod repositories;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting landing page API");

    let config = AppConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let jwt_service = JwtService::new(JwtConfig::from_env());
    let mailer = Mailer::new(MailerConfig::from_env());
    let state = AppState::new(pool, config, jwt_service, mailer);

    if state.billing.is_none() {
        warn!("Stripe is not configured; payment routes will return 503");
    }

    seed_admin(&state).await?;

    tokio::fs::create_dir_all(&state.config.upload_dir).await?;

    let address = state.config.bind_address();
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Landing page API listening on {}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the configured super-admin account on first start
async fn seed_admin(state: &AppState) -> Result<()> {
    let Some((username, email, password)) = state.config.admin_seed() else {
        return Ok(());
    };

    let password_hash = hash_password(password)?;
    if state
        .users()
        .seed_admin(username, email, password_hash)
        .await?
        .is_none()
    {
        info!("Admin account {} was not seeded", username);
    }

    Ok(())
}
