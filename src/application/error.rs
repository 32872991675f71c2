use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Movement not found: {0}")]
    MovementNotFound(String),

    #[error("Movement already exists: {0}")]
    DuplicateMovement(String),

    #[error("Movement has no id")]
    MissingMovementId,

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
