//! User model and related functionality

use common::tier::{PlanTier, SubscriptionSnapshot};
use serde::Serialize;

/// User entity
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub plan_tier: PlanTier,
    pub is_verified: bool,
    pub is_active: bool,
    pub verification_token: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<i64>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_expires_at: Option<i64>,
    pub created_at: i64,
}

impl User {
    /// Subscription facts used by tier reconciliation
    pub fn subscription(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            expires_at: self.subscription_expires_at,
        }
    }
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub plan_tier: PlanTier,
    pub is_verified: bool,
    pub verification_token: Option<String>,
}

/// User as returned to the client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub plan_tier: PlanTier,
    pub is_verified: bool,
    pub is_active: bool,
    pub slug: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_expires_at: Option<i64>,
    pub created_at: i64,
}

impl UserProfile {
    pub fn new(user: &User, slug: Option<String>) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            plan_tier: user.plan_tier,
            is_verified: user.is_verified,
            is_active: user.is_active,
            slug,
            subscription_status: user.subscription_status.clone(),
            subscription_expires_at: user.subscription_expires_at,
            created_at: user.created_at,
        }
    }
}
