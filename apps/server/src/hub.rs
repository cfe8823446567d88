//! In-memory document hub backed by SQLite.
//!
//! Each document path has a `watch` channel carrying its latest record. Writes
//! are serialized, persisted first, then published, so the change feed never
//! announces a version that is not on disk. The version is stored with the
//! document and survives restarts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info};
use tripsync_core::sync::snapshot_last_updated;
use tripsync_core::DocumentPath;
use tripsync_storage_sqlite::{SqliteKeyValueStore, StorageError};

/// Namespace of the persisted documents in the key-value table.
pub const DOCUMENTS_NAMESPACE: &str = "documents";

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub document: Option<Value>,
    /// Write counter. 0 means the document has never existed.
    pub version: u64,
}

impl DocumentRecord {
    pub fn last_updated(&self) -> Option<i64> {
        self.document.as_ref().and_then(snapshot_last_updated)
    }
}

/// Row value in the `documents` namespace.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u64,
    document: Value,
}

pub struct DocumentHub {
    store: SqliteKeyValueStore,
    channels: Mutex<HashMap<String, watch::Sender<DocumentRecord>>>,
    write_lock: AsyncMutex<()>,
}

impl DocumentHub {
    pub fn new(store: SqliteKeyValueStore) -> Self {
        Self {
            store,
            channels: Mutex::new(HashMap::new()),
            write_lock: AsyncMutex::new(()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<DocumentRecord>>> {
        self.channels.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Channel for `path`, loading the persisted document on first use.
    async fn channel(&self, path: &DocumentPath) -> Result<watch::Sender<DocumentRecord>, StorageError> {
        let key = path.to_string();
        if let Some(sender) = self.channels().get(&key) {
            return Ok(sender.clone());
        }

        let store = self.store.clone();
        let lookup_key = key.clone();
        let persisted = tokio::task::spawn_blocking(move || store.get(&lookup_key))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        let record = match persisted {
            Some(raw) => {
                let stored: StoredDocument = serde_json::from_str(&raw)?;
                DocumentRecord {
                    document: Some(stored.document),
                    version: stored.version,
                }
            }
            None => DocumentRecord {
                document: None,
                version: 0,
            },
        };
        debug!("Loaded document {} at version {}", key, record.version);

        let mut channels = self.channels();
        let sender = channels
            .entry(key)
            .or_insert_with(|| watch::channel(record).0);
        Ok(sender.clone())
    }

    pub async fn get(&self, path: &DocumentPath) -> Result<DocumentRecord, StorageError> {
        Ok(self.channel(path).await?.borrow().clone())
    }

    /// Overwrites the document and publishes the new version.
    pub async fn put(&self, path: &DocumentPath, document: Value) -> Result<DocumentRecord, StorageError> {
        let sender = self.channel(path).await?;
        let _guard = self.write_lock.lock().await;

        let stored = StoredDocument {
            version: sender.borrow().version + 1,
            document,
        };
        let raw = serde_json::to_string(&stored)?;
        let store = self.store.clone();
        let key = path.to_string();
        tokio::task::spawn_blocking(move || store.put(&key, &raw))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        sender.send_replace(DocumentRecord {
            document: Some(stored.document),
            version: stored.version,
        });
        let record = sender.borrow().clone();
        info!(
            "Stored {} at version {} (lastUpdated {:?})",
            path,
            record.version,
            record.last_updated()
        );
        Ok(record)
    }

    /// Waits up to `timeout` for the version to differ from `after`. Returns
    /// the current record either way.
    ///
    /// A cursor ahead of the current version cannot have come from this
    /// database, so it is answered immediately.
    pub async fn wait_for_change(
        &self,
        path: &DocumentPath,
        after: u64,
        timeout: Duration,
    ) -> Result<DocumentRecord, StorageError> {
        let mut receiver = self.channel(path).await?.subscribe();
        let changed =
            match tokio::time::timeout(timeout, receiver.wait_for(|record| record.version != after))
                .await
            {
                Ok(Ok(record)) => Some(record.clone()),
                _ => None,
            };
        Ok(changed.unwrap_or_else(|| receiver.borrow().clone()))
    }
}
