//! Visit statistics models

use serde::Serialize;

/// Visits on one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentVisit {
    pub visited_at: i64,
    /// Leading characters of the visitor hash, enough to tell visitors apart
    pub visitor: String,
}

/// Response of `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStats {
    pub slug: String,
    pub total: i64,
    pub last_24h: i64,
    pub last_7d: i64,
    pub daily: Vec<DailyCount>,
    pub recent: Vec<RecentVisit>,
}
