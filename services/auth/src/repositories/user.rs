//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use common::content::ContentDocument;
use common::database::unix_timestamp;
use common::error::{DatabaseError, DatabaseResult};
use common::tier::{PlanTier, TierEvent, reconcile};
use rand::{Rng, distributions::Alphanumeric};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::models::{NewUser, User};
use crate::validation::slugify;

const USER_COLUMNS: &str = "id, username, email, password_hash, plan_tier, is_verified, \
     is_active, verification_token, reset_token, reset_token_expires_at, stripe_customer_id, \
     stripe_subscription_id, subscription_status, subscription_expires_at, created_at";

/// Hash a password with Argon2 and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(password_hash)
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Random URL-safe token for email verification and password reset links
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn map_user(row: &SqliteRow) -> DatabaseResult<User> {
    let plan_tier: String = row.try_get("plan_tier")?;
    let plan_tier = plan_tier
        .parse::<PlanTier>()
        .map_err(|e| DatabaseError::Corrupt(e.to_string()))?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        plan_tier,
        is_verified: row.try_get("is_verified")?,
        is_active: row.try_get("is_active")?,
        verification_token: row.try_get("verification_token")?,
        reset_token: row.try_get("reset_token")?,
        reset_token_expires_at: row.try_get("reset_token_expires_at")?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        subscription_status: row.try_get("subscription_status")?,
        subscription_expires_at: row.try_get("subscription_expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Pick the first free slug among `base`, `base-2`, `base-3`, ...
async fn unique_slug(conn: &mut SqliteConnection, base: &str) -> DatabaseResult<String> {
    let mut candidate = base.to_string();
    let mut suffix = 2;

    loop {
        let taken = sqlx::query("SELECT 1 FROM pages WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();

        if !taken {
            return Ok(candidate);
        }

        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether a username is taken (case-insensitive)
    pub async fn username_exists(&self, username: &str) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Whether an email is registered (case-insensitive)
    pub async fn email_exists(&self, email: &str) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Create a user together with its page in a single transaction
    ///
    /// Returns the stored user and the slug assigned to the page.
    pub async fn create_with_page(
        &self,
        new_user: &NewUser,
        content: &ContentDocument,
    ) -> DatabaseResult<(User, String)> {
        info!("Creating new user: {}", new_user.username);

        let content = content
            .to_stored()
            .map_err(|e| DatabaseError::Corrupt(e.to_string()))?;
        let now = unix_timestamp();

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, plan_tier, is_verified,
                               is_active, verification_token, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.plan_tier.as_str())
        .bind(new_user.is_verified)
        .bind(&new_user.verification_token)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let user = map_user(&row)?;

        let slug = unique_slug(&mut *tx, &slugify(&user.username)).await?;

        sqlx::query(
            r#"
            INSERT INTO pages (user_id, slug, content, is_published, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(user.id)
        .bind(&slug)
        .bind(&content)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id = user.id, slug = %slug, "User and page created");
        Ok((user, slug))
    }

    /// Find a user by username or email
    pub async fn find_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1"
        ))
        .bind(username_or_email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Find the user owning a billing subscription
    pub async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE stripe_subscription_id = ?"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Slug of the user's page, if any
    pub async fn page_slug(&self, user_id: i64) -> DatabaseResult<Option<String>> {
        let slug = sqlx::query_scalar("SELECT slug FROM pages WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slug)
    }

    /// Find the user holding an email verification token
    pub async fn find_by_verification_token(&self, token: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Mark the user verified and consume the verification token
    pub async fn mark_verified(&self, user_id: i64) -> DatabaseResult<()> {
        info!("Verifying email for user {}", user_id);

        sqlx::query("UPDATE users SET is_verified = 1, verification_token = NULL WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store a password reset token valid until `expires_at`
    pub async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET reset_token = ?, reset_token_expires_at = ? WHERE id = ?")
            .bind(token)
            .bind(expires_at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Find the user holding a reset token that has not expired at `now`
    pub async fn find_by_valid_reset_token(
        &self,
        token: &str,
        now: i64,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = ? AND reset_token_expires_at > ?"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Replace the password hash and consume any reset token
    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> DatabaseResult<()> {
        info!("Updating password for user {}", user_id);

        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, reset_token = NULL, reset_token_expires_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a tier. Callers go through [`UserRepository::apply_tier_event`].
    async fn set_plan_tier(&self, user_id: i64, tier: PlanTier) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET plan_tier = ? WHERE id = ?")
            .bind(tier.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Run tier reconciliation for `event` and persist any change
    ///
    /// Returns the tier the user holds afterwards.
    pub async fn apply_tier_event(&self, user: &User, event: TierEvent) -> DatabaseResult<PlanTier> {
        match reconcile(user.plan_tier, user.subscription(), event) {
            Some(next) => {
                info!(
                    user_id = user.id,
                    from = %user.plan_tier,
                    to = %next,
                    ?event,
                    "Plan tier changed"
                );
                self.set_plan_tier(user.id, next).await?;
                Ok(next)
            }
            None => Ok(user.plan_tier),
        }
    }

    /// Enable or disable an account. Returns false for an unknown user.
    pub async fn set_active(&self, user_id: i64, is_active: bool) -> DatabaseResult<bool> {
        info!("Setting is_active={} for user {}", is_active, user_id);

        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record billing state reported by the payment provider
    ///
    /// `None` values leave the stored column untouched.
    pub async fn update_subscription(
        &self,
        user_id: i64,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
        status: Option<&str>,
        expires_at: Option<i64>,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET stripe_customer_id = COALESCE(?, stripe_customer_id),
                stripe_subscription_id = COALESCE(?, stripe_subscription_id),
                subscription_status = COALESCE(?, subscription_status),
                subscription_expires_at = COALESCE(?, subscription_expires_at)
            WHERE id = ?
            "#,
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(status)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a freshly paid subscription
    ///
    /// Any expiry left over from an earlier subscription is cleared; the
    /// next `customer.subscription.updated` event sets the new period end.
    pub async fn start_subscription(
        &self,
        user_id: i64,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET stripe_customer_id = COALESCE(?, stripe_customer_id),
                stripe_subscription_id = COALESCE(?, stripe_subscription_id),
                subscription_status = 'active',
                subscription_expires_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create the super-admin account unless the username is already taken
    ///
    /// Returns the created user, or `None` when it already existed or its
    /// email belongs to another account.
    pub async fn seed_admin(
        &self,
        username: &str,
        email: &str,
        password_hash: String,
    ) -> DatabaseResult<Option<User>> {
        if self.username_exists(username).await? {
            return Ok(None);
        }
        if self.email_exists(email).await? {
            warn!(
                "Not seeding admin {}: email {} belongs to another account",
                username, email
            );
            return Ok(None);
        }

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_lowercase(),
            password_hash,
            plan_tier: PlanTier::AdmServer,
            is_verified: true,
            verification_token: None,
        };
        let (user, _slug) = self
            .create_with_page(&new_user, &ContentDocument::starter(username))
            .await?;

        info!("Seeded admin account {}", user.username);
        Ok(Some(user))
    }
}
