//! Common library for the landing page builder
//!
//! This crate provides functionality shared by the auth library and the API
//! server: SQLite connectivity and migrations, database errors, plan tiers
//! with their transition rules, and the versioned page content document.
//!
//! ```rust,no_run
//! use common::content::ContentDocument;
//! use common::database::{DatabaseConfig, init_pool};
//! use common::tier::PlanTier;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     let raw: String = sqlx::query_scalar("SELECT content FROM pages WHERE slug = ?")
//!         .bind("alice")
//!         .fetch_one(&pool)
//!         .await?;
//!     let public = ContentDocument::from_stored(&raw)?.gated_for(PlanTier::Basic);
//!     assert!(!public.sales.enabled);
//!     Ok(())
//! }
//! ```

pub mod content;
pub mod database;
pub mod error;
pub mod tier;
