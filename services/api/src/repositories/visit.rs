//! Visit log repository

use chrono::{DateTime, Duration, NaiveDate};
use common::error::DatabaseResult;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::stats::{DailyCount, PageStats, RecentVisit};

/// A visitor is counted at most once per page within this window
pub const DEDUP_WINDOW_SECONDS: i64 = 30 * 60;

/// Number of days covered by the per-day breakdown
pub const DAILY_WINDOW_DAYS: i64 = 30;

const RECENT_VISITS: i64 = 5;

/// One-way hash of a client address; raw addresses are never stored
pub fn hash_ip(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

fn day_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

/// Visit repository
#[derive(Clone)]
pub struct VisitRepository {
    pool: SqlitePool,
}

impl VisitRepository {
    /// Create a new visit repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a visit unless the same visitor was already counted for this
    /// page within the dedup window
    ///
    /// The existence check and the insert are one statement, so concurrent
    /// identical requests cannot both insert. Returns whether a row was added.
    pub async fn record(
        &self,
        slug: &str,
        ip_hash: &str,
        is_admin_hit: bool,
        now: i64,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO visits (slug, ip_hash, is_admin_hit, created_at)
            SELECT ?1, ?2, ?3, ?4
            WHERE NOT EXISTS (
                SELECT 1 FROM visits
                WHERE slug = ?1 AND ip_hash = ?2 AND created_at >= ?5
            )
            "#,
        )
        .bind(slug)
        .bind(ip_hash)
        .bind(is_admin_hit)
        .bind(now)
        .bind(now - DEDUP_WINDOW_SECONDS)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Visits to `slug` since `since` (all time when `None`), excluding owner hits
    pub async fn count_since(&self, slug: &str, since: Option<i64>) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM visits
            WHERE slug = ? AND is_admin_hit = 0 AND created_at >= ?
            "#,
        )
        .bind(slug)
        .bind(since.unwrap_or(i64::MIN))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Per-day visit counts (UTC) for the last [`DAILY_WINDOW_DAYS`] days,
    /// oldest first, with empty days reported as zero
    pub async fn daily_counts(&self, slug: &str, now: i64) -> DatabaseResult<Vec<DailyCount>> {
        let since = now - (DAILY_WINDOW_DAYS - 1) * 86_400;
        let first_day = day_of(since).unwrap_or(NaiveDate::MIN);
        let start = first_day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(since);

        let rows = sqlx::query(
            r#"
            SELECT date(created_at, 'unixepoch') AS day, COUNT(*) AS count
            FROM visits
            WHERE slug = ? AND is_admin_hit = 0 AND created_at >= ?
            GROUP BY day
            "#,
        )
        .bind(slug)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;

        let mut by_day = HashMap::with_capacity(rows.len());
        for row in rows {
            let day: String = row.try_get("day")?;
            let count: i64 = row.try_get("count")?;
            by_day.insert(day, count);
        }

        let daily = (0..DAILY_WINDOW_DAYS)
            .map(|offset| {
                let date = (first_day + Duration::days(offset))
                    .format("%Y-%m-%d")
                    .to_string();
                let count = by_day.get(&date).copied().unwrap_or(0);
                DailyCount { date, count }
            })
            .collect();

        Ok(daily)
    }

    /// Most recent visits, newest first, excluding owner hits
    pub async fn recent(&self, slug: &str, limit: i64) -> DatabaseResult<Vec<RecentVisit>> {
        let rows = sqlx::query(
            r#"
            SELECT ip_hash, created_at FROM visits
            WHERE slug = ? AND is_admin_hit = 0
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(slug)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DatabaseResult<RecentVisit> {
                let ip_hash: String = row.try_get("ip_hash")?;
                Ok(RecentVisit {
                    visited_at: row.try_get("created_at")?,
                    visitor: ip_hash.chars().take(8).collect(),
                })
            })
            .collect()
    }

    /// Full statistics for a page as of `now`
    pub async fn stats(&self, slug: &str, now: i64) -> DatabaseResult<PageStats> {
        Ok(PageStats {
            slug: slug.to_string(),
            total: self.count_since(slug, None).await?,
            last_24h: self.count_since(slug, Some(now - 86_400)).await?,
            last_7d: self.count_since(slug, Some(now - 7 * 86_400)).await?,
            daily: self.daily_counts(slug, now).await?,
            recent: self.recent(slug, RECENT_VISITS).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::database::{DatabaseConfig, init_in_memory_pool, init_pool};

    const NOW: i64 = 1_700_000_000;

    async fn repo() -> VisitRepository {
        VisitRepository::new(init_in_memory_pool().await.unwrap())
    }

    #[test]
    fn test_hash_ip_is_stable_and_opaque() {
        let hash = hash_ip("203.0.113.9");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_ip("203.0.113.9"));
        assert_ne!(hash, hash_ip("203.0.113.10"));
        assert!(!hash.contains("203"));
    }

    #[tokio::test]
    async fn test_record_dedups_within_window() {
        let repo = repo().await;
        let ip = hash_ip("1.2.3.4");

        assert!(repo.record("alice", &ip, false, NOW).await.unwrap());
        assert!(!repo.record("alice", &ip, false, NOW + 60).await.unwrap());
        assert!(
            !repo
                .record("alice", &ip, false, NOW + DEDUP_WINDOW_SECONDS)
                .await
                .unwrap()
        );
        // Other pages and other visitors are independent
        assert!(repo.record("bob", &ip, false, NOW + 60).await.unwrap());
        assert!(repo.record("alice", &hash_ip("5.6.7.8"), false, NOW + 60).await.unwrap());
        // The window has passed
        assert!(
            repo.record("alice", &ip, false, NOW + DEDUP_WINDOW_SECONDS + 1)
                .await
                .unwrap()
        );

        assert_eq!(repo.count_since("alice", None).await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_visits_record_once() {
        let dir = std::env::temp_dir().join(format!("landing-visits-{}", uuid::Uuid::new_v4()));
        let pool = init_pool(&DatabaseConfig {
            database_url: format!("sqlite://{}", dir.join("visits.db").display()),
            max_connections: 8,
        })
        .await
        .unwrap();
        let repo = VisitRepository::new(pool.clone());
        let ip = hash_ip("9.9.9.9");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let ip = ip.clone();
                tokio::spawn(async move { repo.record("carol", &ip, false, NOW).await })
            })
            .collect();

        let mut inserted = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(repo.count_since("carol", None).await.unwrap(), 1);

        pool.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_stats_windows_and_admin_hits() {
        let repo = repo().await;

        repo.record("dave", &hash_ip("a"), false, NOW - 3_600).await.unwrap();
        repo.record("dave", &hash_ip("b"), false, NOW - 2 * 86_400).await.unwrap();
        repo.record("dave", &hash_ip("c"), false, NOW - 20 * 86_400).await.unwrap();
        repo.record("dave", &hash_ip("d"), false, NOW - 40 * 86_400).await.unwrap();
        repo.record("dave", &hash_ip("owner"), true, NOW - 60).await.unwrap();

        let stats = repo.stats("dave", NOW).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.last_24h, 1);
        assert_eq!(stats.last_7d, 2);
        assert_eq!(stats.daily.len(), DAILY_WINDOW_DAYS as usize);
        assert_eq!(stats.daily.iter().map(|d| d.count).sum::<i64>(), 3);
        assert_eq!(stats.recent.len(), 4);
        assert_eq!(stats.recent[0].visited_at, NOW - 3_600);

        let today = day_of(NOW).unwrap().format("%Y-%m-%d").to_string();
        assert_eq!(stats.daily.last().unwrap().date, today);
    }

    #[tokio::test]
    async fn test_recent_is_capped_at_five() {
        let repo = repo().await;
        for i in 0..7 {
            repo.record("erin", &hash_ip(&i.to_string()), false, NOW - i)
                .await
                .unwrap();
        }

        let stats = repo.stats("erin", NOW).await.unwrap();
        assert_eq!(stats.recent.len(), 5);
        assert_eq!(stats.recent[0].visited_at, NOW);
    }
}
