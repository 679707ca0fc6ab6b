//! Database error types shared across services

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Errors produced by the database infrastructure layer
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a connection or build the pool
    #[error("database connection error: {0}")]
    Connect(#[source] SqlxError),

    /// A query against an established pool failed
    #[error("database query error: {0}")]
    Query(#[source] SqlxError),

    /// Schema bootstrap failed
    #[error("database migration error: {0}")]
    Migrate(#[source] SqlxError),

    /// Invalid connection configuration
    #[error("database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
