//! Page models for the content routes

use common::content::ContentDocument;
use common::tier::PlanTier;
use serde::{Deserialize, Serialize};

/// Stored page row
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub user_id: i64,
    pub slug: String,
    /// Serialized content document
    pub content: String,
    pub is_published: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A page joined with the owner facts that decide how it is served
#[derive(Debug, Clone)]
pub struct PageWithOwner {
    pub page: PageRecord,
    pub owner_tier: PlanTier,
    pub owner_active: bool,
}

/// Public rendering of a page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPage {
    pub slug: String,
    pub plan_tier: PlanTier,
    pub content: ContentDocument,
}

/// The caller's own page, as stored
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyPage {
    pub slug: String,
    pub is_published: bool,
    pub plan_tier: PlanTier,
    pub content: ContentDocument,
    pub updated_at: i64,
}

/// Query string of the public page route
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub track: bool,
}

/// Body of `PUT /my-page`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePageRequest {
    pub content: Option<serde_json::Value>,
    pub is_published: Option<bool>,
}
