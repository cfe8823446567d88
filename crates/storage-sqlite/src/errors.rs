//! Storage error types.

use thiserror::Error;
use tripsync_core::errors::MirrorError;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for MirrorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Json(e) => MirrorError::Json(e),
            other => MirrorError::Storage(other.to_string()),
        }
    }
}
