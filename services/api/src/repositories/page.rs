//! Page repository for database operations

use common::database::unix_timestamp;
use common::error::{DatabaseError, DatabaseResult};
use common::tier::PlanTier;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::page::{PageRecord, PageWithOwner};

fn map_page(row: &SqliteRow) -> DatabaseResult<PageRecord> {
    Ok(PageRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        is_published: row.try_get("is_published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Page repository
#[derive(Clone)]
pub struct PageRepository {
    pool: SqlitePool,
}

impl PageRepository {
    /// Create a new page repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a page by slug together with its owner's tier and status
    pub async fn find_with_owner(&self, slug: &str) -> DatabaseResult<Option<PageWithOwner>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.user_id, p.slug, p.content, p.is_published, p.created_at,
                   p.updated_at, u.plan_tier, u.is_active
            FROM pages p
            JOIN users u ON u.id = p.user_id
            WHERE p.slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let owner_tier: String = row.try_get("plan_tier")?;
        Ok(Some(PageWithOwner {
            page: map_page(&row)?,
            owner_tier: owner_tier
                .parse::<PlanTier>()
                .map_err(|e| DatabaseError::Corrupt(e.to_string()))?,
            owner_active: row.try_get("is_active")?,
        }))
    }

    /// Find the page owned by a user
    pub async fn find_by_user(&self, user_id: i64) -> DatabaseResult<Option<PageRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, slug, content, is_published, created_at, updated_at
            FROM pages
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_page).transpose()
    }

    /// Replace the content of the user's page
    ///
    /// `is_published` is left unchanged when `None`. Returns false when the
    /// user has no page.
    pub async fn update_content(
        &self,
        user_id: i64,
        content: &str,
        is_published: Option<bool>,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pages
            SET content = ?, is_published = COALESCE(?, is_published), updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(content)
        .bind(is_published)
        .bind(unix_timestamp())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Updated page content for user {}", user_id);
        }
        Ok(result.rows_affected() > 0)
    }
}
