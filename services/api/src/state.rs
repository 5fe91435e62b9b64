//! Application state shared across handlers

use auth::AuthState;
use auth::jwt::JwtService;
use auth::mailer::Mailer;
use auth::rate_limiter::RateLimiter;
use auth::repositories::UserRepository;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::billing::StripeClient;
use crate::config::AppConfig;
use crate::repositories::{AdminRepository, PageRepository, VisitRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub auth: AuthState,
    pub page_repository: PageRepository,
    pub visit_repository: VisitRepository,
    pub admin_repository: AdminRepository,
    /// `None` when Stripe is not configured
    pub billing: Option<StripeClient>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, jwt_service: JwtService, mailer: Mailer) -> Self {
        let billing = StripeClient::from_config(&config);

        Self {
            auth: AuthState {
                users: UserRepository::new(pool.clone()),
                jwt_service,
                mailer,
                rate_limiter: RateLimiter::default(),
                trust_proxy: config.trust_proxy,
            },
            page_repository: PageRepository::new(pool.clone()),
            visit_repository: VisitRepository::new(pool.clone()),
            admin_repository: AdminRepository::new(pool.clone()),
            billing,
            config: Arc::new(config),
            db_pool: pool,
        }
    }

    /// Shorthand for the user repository
    pub fn users(&self) -> &UserRepository {
        &self.auth.users
    }
}
