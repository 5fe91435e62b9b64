//! Storage errors shared by the auth and api crates

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Failure talking to or reading from the SQLite store
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[from] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// A stored value could not be decoded into its domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    /// True when the underlying failure is a UNIQUE constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(SqlxError::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
