//! Error types shared by the planner domain and the sync engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Malformed entity input. Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Event title is required")]
    MissingTitle,

    #[error("Event date is required")]
    MissingDate,

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Date {date} is outside the trip ({start} to {end})")]
    DateOutsideTrip {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Trip window ends ({end}) before it starts ({start})")]
    InvalidTripWindow { start: NaiveDate, end: NaiveDate },

    #[error("Unknown event category '{0}'")]
    UnknownCategory(String),

    #[error("Invalid time '{0}': expected HH:MM in 15-minute steps")]
    InvalidTime(String),

    #[error("Invalid cost '{0}'")]
    InvalidCost(String),

    #[error("Cost cannot be negative")]
    NegativeCost,

    #[error("Text is required")]
    EmptyText,

    #[error("Unknown group '{0}'")]
    UnknownGroup(String),

    #[error("No entry at position {index} in {list} of group '{group_id}'")]
    IndexOutOfRange {
        group_id: String,
        list: &'static str,
        index: usize,
    },

    #[error("No entry '{entry_id}' in {list} of group '{group_id}'")]
    UnknownEntry {
        group_id: String,
        list: &'static str,
        entry_id: String,
    },

    #[error("Invalid document path '{0}': expected <collection>/<document>")]
    InvalidDocumentPath(String),
}

/// Failures reported by a remote document store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store request failed: {0}")]
    Request(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// The remote write failed or could not be verified.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Remote store is unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Remote write failed: {0}")]
    WriteFailed(String),

    #[error("Write verification failed: expected lastUpdated {expected}, read back {actual:?}")]
    VerificationFailed { expected: i64, actual: Option<i64> },

    #[error("Failed to serialize planner document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            other => Self::WriteFailed(other.to_string()),
        }
    }
}

/// Local mirror failures. These are logged by the mirror and never surface to callers.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror storage error: {0}")]
    Storage(String),

    #[error("Mirror payload error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Umbrella error returned by the sync engine's public operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Connectivity error: {0}")]
    Connectivity(String),
}

impl PlannerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
