//! Wire types of the document store REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GET /api/v1/documents/{collection}/{document}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEnvelope {
    pub path: String,
    pub document: Value,
    #[serde(default)]
    pub last_updated: Option<i64>,
    /// Server-side write counter, used as the change-feed cursor.
    pub version: u64,
}

/// PUT /api/v1/documents/{collection}/{document}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAck {
    pub path: String,
    #[serde(default)]
    pub last_updated: Option<i64>,
    pub version: u64,
}

/// GET /api/v1/documents/{collection}/{document}/changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResponse {
    /// False when the long-poll timed out without a newer version.
    pub changed: bool,
    pub version: u64,
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}
