use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tripsync_storage_sqlite::SqliteKeyValueStore;

use crate::api;
use crate::hub::{DocumentHub, DOCUMENTS_NAMESPACE};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub db_path: PathBuf,
    /// Upper bound for a client-requested long-poll timeout.
    pub long_poll_max: Duration,
}

pub struct AppState {
    pub hub: Arc<DocumentHub>,
    pub long_poll_max: Duration,
}

pub fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = tripsync_storage_sqlite::init(&db_path)?;
    let store = SqliteKeyValueStore::new(pool, DOCUMENTS_NAMESPACE);
    Ok(Arc::new(AppState {
        hub: Arc::new(DocumentHub::new(store)),
        long_poll_max: config.long_poll_max,
    }))
}

async fn health() -> &'static str {
    "ok"
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::router())
        .with_state(state)
}
