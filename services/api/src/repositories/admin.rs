//! Admin console queries

use chrono::DateTime;
use common::error::{DatabaseError, DatabaseResult};
use common::tier::PlanTier;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::admin::AdminUserSummary;

/// Format a Unix timestamp as `YYYY-MM-DD` (UTC)
pub fn format_join_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Repository for operations spanning all tenants
#[derive(Clone)]
pub struct AdminRepository {
    pool: SqlitePool,
}

impl AdminRepository {
    /// Create a new admin repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every user with their slug and visit count, newest first
    pub async fn list_users(&self) -> DatabaseResult<Vec<AdminUserSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, u.plan_tier, u.is_verified, u.is_active,
                   u.subscription_status, u.created_at, p.slug,
                   COUNT(v.id) AS visit_count
            FROM users u
            LEFT JOIN pages p ON p.user_id = u.id
            LEFT JOIN visits v ON v.slug = p.slug AND v.is_admin_hit = 0
            GROUP BY u.id, p.slug
            ORDER BY u.created_at DESC, u.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DatabaseResult<AdminUserSummary> {
                let plan_tier: String = row.try_get("plan_tier")?;
                let created_at: i64 = row.try_get("created_at")?;
                Ok(AdminUserSummary {
                    id: row.try_get("id")?,
                    username: row.try_get("username")?,
                    email: row.try_get("email")?,
                    plan_tier: plan_tier
                        .parse::<PlanTier>()
                        .map_err(|e| DatabaseError::Corrupt(e.to_string()))?,
                    is_verified: row.try_get("is_verified")?,
                    is_active: row.try_get("is_active")?,
                    slug: row.try_get("slug")?,
                    visit_count: row.try_get("visit_count")?,
                    subscription_status: row.try_get("subscription_status")?,
                    joined: format_join_date(created_at),
                })
            })
            .collect()
    }

    /// Delete a user with their visits and pages in one transaction
    ///
    /// Returns false (and changes nothing) when the user does not exist.
    pub async fn delete_user(&self, user_id: i64) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        let visits = sqlx::query(
            "DELETE FROM visits WHERE slug IN (SELECT slug FROM pages WHERE user_id = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let pages = sqlx::query("DELETE FROM pages WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let users = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if users.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;

        info!(
            user_id,
            visits = visits.rows_affected(),
            pages = pages.rows_affected(),
            "Deleted user"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::VisitRepository;
    use crate::test_support::{insert_user, test_pool};

    #[test]
    fn test_format_join_date() {
        assert_eq!(format_join_date(0), "1970-01-01");
        assert_eq!(format_join_date(1_700_000_000), "2023-11-14");
    }

    #[tokio::test]
    async fn test_list_users_counts_visits_without_owner_hits() {
        let pool = test_pool().await;
        let admin = AdminRepository::new(pool.clone());
        let visits = VisitRepository::new(pool.clone());

        let alice = insert_user(&pool, "alice", PlanTier::Premium).await;
        insert_user(&pool, "bob", PlanTier::Static).await;

        visits.record("alice", "v1", false, 100).await.unwrap();
        visits.record("alice", "v2", false, 100).await.unwrap();
        visits.record("alice", "owner", true, 100).await.unwrap();

        let users = admin.list_users().await.unwrap();
        assert_eq!(users.len(), 2);

        let row = users.iter().find(|u| u.id == alice.id).unwrap();
        assert_eq!(row.slug.as_deref(), Some("alice"));
        assert_eq!(row.visit_count, 2);
        assert_eq!(row.plan_tier, PlanTier::Premium);
        assert_eq!(row.joined.len(), 10);

        let bob = users.iter().find(|u| u.username == "bob").unwrap();
        assert_eq!(bob.visit_count, 0);
    }

    #[tokio::test]
    async fn test_delete_user_removes_visits_pages_and_user() {
        let pool = test_pool().await;
        let admin = AdminRepository::new(pool.clone());
        let visits = VisitRepository::new(pool.clone());

        let carol = insert_user(&pool, "carol", PlanTier::Basic).await;
        let dave = insert_user(&pool, "dave", PlanTier::Basic).await;
        visits.record("carol", "v1", false, 100).await.unwrap();
        visits.record("dave", "v1", false, 100).await.unwrap();

        assert!(admin.delete_user(carol.id).await.unwrap());

        let count = |sql: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, i64>(sql)
                    .fetch_one(&pool)
                    .await
                    .unwrap()
            }
        };
        assert_eq!(count("SELECT COUNT(*) FROM users").await, 1);
        assert_eq!(count("SELECT COUNT(*) FROM pages").await, 1);
        assert_eq!(count("SELECT COUNT(*) FROM visits").await, 1);

        assert!(!admin.delete_user(carol.id).await.unwrap());
        assert!(admin.delete_user(dave.id).await.unwrap());
    }
}
