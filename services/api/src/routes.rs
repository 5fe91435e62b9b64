//! API service routes

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

use crate::state::AppState;

pub mod admin;
pub mod content;
pub mod payment;
pub mod stats;
pub mod upload;

/// CORS for the configured web client origin
pub fn configure_cors(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match frontend_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!("FRONTEND_URL {:?} is not a valid origin; CORS disabled", frontend_url);
            cors
        }
    }
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let cors = configure_cors(&state.config.frontend_url);
    let uploads = ServeDir::new(&state.config.upload_dir);
    let auth_routes = auth::routes::create_router(state.auth.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/content", content::router(&state))
        .nest("/api/admin", admin::router(&state))
        .nest("/api/stats", stats::router(&state))
        .nest("/api/upload", upload::router(&state))
        .nest("/api/payment", payment::router(&state))
        .with_state(state)
        .nest("/api/auth", auth_routes)
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match common::database::health_check(&state.db_pool).await {
        Ok(_) => "ok",
        Err(e) => {
            error!("Database health check failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "service": "landing-api",
        "database": database,
    }))
}
