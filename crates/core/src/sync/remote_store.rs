//! Contract for the remote document store holding the planner document.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::StoreError;

/// One push notification from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreNotification {
    /// Current document, `None` when it does not exist yet.
    pub snapshot: Option<Value>,
    /// Set when the notification reflects a local write the server has not confirmed.
    pub has_pending_writes: bool,
}

impl StoreNotification {
    pub fn confirmed(snapshot: Option<Value>) -> Self {
        Self {
            snapshot,
            has_pending_writes: false,
        }
    }

    pub fn pending(snapshot: Value) -> Self {
        Self {
            snapshot: Some(snapshot),
            has_pending_writes: true,
        }
    }
}

pub type NotificationStream = BoxStream<'static, Result<StoreNotification, StoreError>>;

/// A single addressable document with full-overwrite writes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Overwrites the whole document.
    async fn set(&self, document: Value) -> Result<(), StoreError>;

    /// Point read. `None` when the document does not exist.
    async fn get(&self) -> Result<Option<Value>, StoreError>;

    /// Opens a change feed. Fails when the store is unreachable.
    async fn subscribe(&self) -> Result<NotificationStream, StoreError>;
}

/// Adapts a channel receiver into a [`NotificationStream`].
pub fn notification_stream(
    receiver: mpsc::UnboundedReceiver<Result<StoreNotification, StoreError>>,
) -> NotificationStream {
    Box::pin(stream::unfold(receiver, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
