//! Helpers shared by the router and repository tests

use auth::jwt::{JwtConfig, JwtService};
use auth::mailer::Mailer;
use auth::models::{NewUser, User};
use auth::repositories::UserRepository;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use common::content::ContentDocument;
use common::database::init_in_memory_pool;
use common::tier::PlanTier;
use serde_json::Value;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::routes::create_router;
use crate::state::AppState;

pub async fn test_pool() -> SqlitePool {
    init_in_memory_pool().await.unwrap()
}

/// Insert a verified, active user (and page) without hashing a password
pub async fn insert_user(pool: &SqlitePool, username: &str, plan_tier: PlanTier) -> User {
    let new_user = NewUser {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "unused".to_string(),
        plan_tier,
        is_verified: true,
        verification_token: None,
    };

    UserRepository::new(pool.clone())
        .create_with_page(&new_user, &ContentDocument::starter(username))
        .await
        .unwrap()
        .0
}

pub fn test_state(pool: SqlitePool, config: AppConfig) -> AppState {
    let jwt_service = JwtService::new(JwtConfig {
        secret: "test-secret".to_string(),
        token_expiry: 3600,
    });
    AppState::new(pool, config, jwt_service, Mailer::disabled("http://localhost:5173"))
}

/// Fresh upload directory under the system temp dir
pub fn temp_upload_dir() -> String {
    std::env::temp_dir()
        .join(format!("landing-uploads-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

pub fn app(state: AppState) -> Router {
    create_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

pub fn bearer(state: &AppState, user: &User) -> String {
    format!(
        "Bearer {}",
        state.auth.jwt_service.generate_token(user).unwrap()
    )
}

/// Run one request and decode the JSON body (`Null` when empty)
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}
