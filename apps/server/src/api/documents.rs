//! Document endpoints.
//!
//! GET    /documents/{collection}/{document}          point read (404 when absent)
//! PUT    /documents/{collection}/{document}          full overwrite
//! GET    /documents/{collection}/{document}/changes  long-poll until the version differs from `after`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tripsync_core::DocumentPath;
use tripsync_document_client::{ChangeResponse, DocumentEnvelope, WriteAck};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangesQuery {
    #[serde(default)]
    after: u64,
    timeout_ms: Option<u64>,
}

fn document_path(collection: &str, document: &str) -> ApiResult<DocumentPath> {
    DocumentPath::new(collection, document).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, document)): Path<(String, String)>,
) -> ApiResult<Json<DocumentEnvelope>> {
    let path = document_path(&collection, &document)?;
    let record = state.hub.get(&path).await?;
    let last_updated = record.last_updated();
    match record.document {
        Some(body) => Ok(Json(DocumentEnvelope {
            path: path.to_string(),
            document: body,
            last_updated,
            version: record.version,
        })),
        None => Err(ApiError::NotFound(format!("Document {} not found", path))),
    }
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    Path((collection, document)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<WriteAck>> {
    let path = document_path(&collection, &document)?;
    if !body.is_object() {
        return Err(ApiError::BadRequest(
            "Document body must be a JSON object".to_string(),
        ));
    }
    let record = state.hub.put(&path, body).await?;
    Ok(Json(WriteAck {
        path: path.to_string(),
        last_updated: record.last_updated(),
        version: record.version,
    }))
}

async fn wait_for_change(
    State(state): State<Arc<AppState>>,
    Path((collection, document)): Path<(String, String)>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<ChangeResponse>> {
    let path = document_path(&collection, &document)?;
    let timeout = query
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.long_poll_max)
        .min(state.long_poll_max);
    debug!("Long-poll on {} after version {} ({:?})", path, query.after, timeout);

    let record = state.hub.wait_for_change(&path, query.after, timeout).await?;
    // A lower version than the cursor means the client saw another database.
    let changed = record.version != query.after;
    let last_updated = record.last_updated();
    Ok(Json(ChangeResponse {
        changed,
        version: record.version,
        document: if changed { record.document } else { None },
        last_updated,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/documents/:collection/:document",
            get(get_document).put(put_document),
        )
        .route(
            "/documents/:collection/:document/changes",
            get(wait_for_change),
        )
}
