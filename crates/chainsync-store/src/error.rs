//! Store error types.

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("serializing event data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns `true` if the error is a unique-constraint violation —
    /// either the same block range was re-processed or a handler wrote a
    /// duplicate `(tx_hash, log_index)`.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}
