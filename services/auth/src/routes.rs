//! Authentication routes, mounted under `/api/auth`

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use common::content::ContentDocument;
use common::database::unix_timestamp;
use common::tier::{PlanTier, TierEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::AuthState;
use crate::error::{AuthError, AuthResult};
use crate::middleware::{AuthUser, auth_middleware, client_ip};
use crate::models::{NewUser, UserProfile};
use crate::repositories::user::{generate_token, hash_password, verify_password};
use crate::validation::{validate_email, validate_password, validate_username};

/// Password reset links stay valid for one hour
pub const RESET_TOKEN_TTL_SECONDS: i64 = 3600;

/// Request for user registration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request for user login
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    /// Username or email
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

/// Response for user login
#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Create the router for the authentication routes
pub fn create_router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(
            state.jwt_service.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-email", post(verify_email))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .merge(protected)
        .with_state(state)
}

/// User registration endpoint
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    validate_username(&username).map_err(AuthError::BadRequest)?;
    validate_email(&email).map_err(AuthError::BadRequest)?;
    validate_password(&payload.password).map_err(AuthError::BadRequest)?;

    if state.users.username_exists(&username).await? {
        return Err(AuthError::BadRequest("Username is already taken".to_string()));
    }
    if state.users.email_exists(&email).await? {
        return Err(AuthError::BadRequest(
            "Email is already registered".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        AuthError::InternalServerError
    })?;
    let verification_token = generate_token();

    let new_user = NewUser {
        username: username.clone(),
        email: email.clone(),
        password_hash,
        plan_tier: PlanTier::Static,
        is_verified: false,
        verification_token: Some(verification_token.clone()),
    };

    let (user, slug) = state
        .users
        .create_with_page(&new_user, &ContentDocument::starter(&username))
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                AuthError::BadRequest("Username or email is already registered".to_string())
            } else {
                AuthError::Database(e)
            }
        })?;

    state
        .mailer
        .send_verification(&user.email, &user.username, &verification_token);

    info!("Registered user {} with page {}", user.username, slug);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful. Please check your email to verify your account.",
            "user": UserProfile::new(&user, Some(slug)),
        })),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let limiter_key = format!("login:{}", client_ip(&headers, addr, state.trust_proxy));
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        return Err(AuthError::TooManyRequests);
    }

    let identifier = payload.username.trim();
    if identifier.is_empty() || payload.password.is_empty() {
        return Err(AuthError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    info!("Login attempt for user: {}", identifier);

    let invalid = || AuthError::Unauthorized("Invalid credentials".to_string());

    let mut user = state
        .users
        .find_by_username_or_email(identifier)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&user.password_hash, &payload.password) {
        warn!("Failed login for user {}", user.username);
        return Err(invalid());
    }

    if !user.is_verified {
        return Err(AuthError::VerificationRequired);
    }

    if !user.is_active {
        return Err(AuthError::Forbidden(
            "Account has been deactivated".to_string(),
        ));
    }

    user.plan_tier = state
        .users
        .apply_tier_event(&user, TierEvent::LoginCheck {
            now: unix_timestamp(),
        })
        .await?;

    let token = state.jwt_service.generate_token(&user).map_err(|e| {
        error!("Failed to generate token: {}", e);
        AuthError::InternalServerError
    })?;

    state.rate_limiter.reset(&limiter_key).await;

    let slug = state.users.page_slug(user.id).await?;
    Ok(Json(LoginResponse {
        token,
        user: UserProfile::new(&user, slug),
    }))
}

/// Email verification endpoint
pub async fn verify_email(
    State(state): State<AuthState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AuthResult<impl IntoResponse> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AuthError::BadRequest(
            "Verification token is required".to_string(),
        ));
    }

    let user = state
        .users
        .find_by_verification_token(token)
        .await?
        .ok_or_else(|| AuthError::BadRequest("Invalid verification token".to_string()))?;

    state.users.mark_verified(user.id).await?;

    Ok(Json(json!({ "message": "Email verified. You can now log in." })))
}

/// Password reset request endpoint
///
/// The response does not reveal whether the email is registered.
pub async fn forgot_password(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    let limiter_key = format!("forgot:{}", client_ip(&headers, addr, state.trust_proxy));
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        return Err(AuthError::TooManyRequests);
    }

    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::BadRequest("Email is required".to_string()));
    }

    if let Some(user) = state.users.find_by_email(&email).await? {
        let token = generate_token();
        state
            .users
            .set_reset_token(user.id, &token, unix_timestamp() + RESET_TOKEN_TTL_SECONDS)
            .await?;
        state
            .mailer
            .send_password_reset(&user.email, &user.username, &token);
    }

    Ok(Json(json!({
        "message": "If that email is registered, a password reset link has been sent."
    })))
}

/// Password reset endpoint
pub async fn reset_password(
    State(state): State<AuthState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AuthError::BadRequest("Reset token is required".to_string()));
    }
    validate_password(&payload.password).map_err(AuthError::BadRequest)?;

    let user = state
        .users
        .find_by_valid_reset_token(token, unix_timestamp())
        .await?
        .ok_or_else(|| AuthError::BadRequest("Invalid or expired reset token".to_string()))?;

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        AuthError::InternalServerError
    })?;
    state.users.update_password(user.id, &password_hash).await?;

    info!("Password reset for user {}", user.username);

    Ok(Json(json!({ "message": "Password has been reset. You can now log in." })))
}

/// Current user profile
pub async fn me(
    State(state): State<AuthState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AuthResult<Json<UserProfile>> {
    let user = state
        .users
        .find_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AuthError::Unauthorized("User no longer exists".to_string()))?;
    let slug = state.users.page_slug(user.id).await?;

    Ok(Json(UserProfile::new(&user, slug)))
}
