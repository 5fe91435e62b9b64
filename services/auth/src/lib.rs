//! Authentication for the landing page builder
//!
//! This crate owns accounts: registration, login, email verification,
//! password reset, JWT issuance and the middleware other route groups use
//! to authenticate callers.

pub mod error;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod validation;

use jwt::JwtService;
use mailer::Mailer;
use rate_limiter::RateLimiter;
use repositories::UserRepository;

/// State shared by the authentication routes
#[derive(Clone)]
pub struct AuthState {
    pub users: UserRepository,
    pub jwt_service: JwtService,
    pub mailer: Mailer,
    pub rate_limiter: RateLimiter,
    /// Take client addresses from `X-Forwarded-For`
    pub trust_proxy: bool,
}
