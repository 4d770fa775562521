//! Error types for the store module.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Message fragment SQLite uses when the backing file is damaged.
pub const CORRUPTION_SIGNATURE: &str = "database disk image is malformed";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// The backing storage is damaged and must be wiped to be usable again.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store can't be reached (e.g. a poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error means the store is corrupted.
    ///
    /// Besides the typed [`StoreError::Corrupted`] kind, any error whose
    /// message carries [`CORRUPTION_SIGNATURE`] (case-insensitive) counts.
    pub fn is_corruption(&self) -> bool {
        match self {
            StoreError::Corrupted(_) => true,
            other => has_corruption_signature(&other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let corrupt = matches!(
            &err,
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
        );
        if corrupt || has_corruption_signature(&err.to_string()) {
            StoreError::Corrupted(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

fn has_corruption_signature(message: &str) -> bool {
    message.to_lowercase().contains(CORRUPTION_SIGNATURE)
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
