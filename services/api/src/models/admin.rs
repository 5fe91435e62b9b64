//! Admin console models

use common::tier::PlanTier;
use serde::{Deserialize, Serialize};

/// One row of the admin user list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub plan_tier: PlanTier,
    pub is_verified: bool,
    pub is_active: bool,
    pub slug: Option<String>,
    /// Visits to the user's page, excluding the owner's own
    pub visit_count: i64,
    pub subscription_status: Option<String>,
    /// Registration date as `YYYY-MM-DD`
    pub joined: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateTierRequest {
    pub plan_tier: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: Option<bool>,
}
