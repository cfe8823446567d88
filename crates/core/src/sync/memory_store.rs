//! In-process remote store.
//!
//! Mirrors the notification behaviour of hosted document databases: a local
//! write is first echoed to subscribers as pending, then confirmed. Fault
//! switches let tests simulate rejected writes, stale read-backs and outages.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::sync::mpsc;

use super::remote_store::{notification_stream, NotificationStream, RemoteStore, StoreNotification};
use crate::errors::StoreError;

type Subscriber = mpsc::UnboundedSender<Result<StoreNotification, StoreError>>;

#[derive(Default)]
struct StoreState {
    document: Option<Value>,
    previous: Option<Value>,
    fail_writes: bool,
    stale_read_back: bool,
    unavailable: bool,
    write_count: usize,
    subscribers: Vec<Subscriber>,
}

impl StoreState {
    fn broadcast(&mut self, notification: StoreNotification) {
        self.subscribers
            .retain(|tx| tx.send(Ok(notification.clone())).is_ok());
    }
}

#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<StoreState>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        let store = Self::new();
        store.lock().document = Some(document);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rejects every subsequent `set`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes `get` return the document as it was before the latest write.
    pub fn set_stale_read_back(&self, stale: bool) {
        self.lock().stale_read_back = stale;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    pub fn document(&self) -> Option<Value> {
        self.lock().document.clone()
    }

    /// Simulates a write from another client.
    pub fn push_remote(&self, document: Value) {
        let mut state = self.lock();
        state.previous = state.document.replace(document.clone());
        state.broadcast(StoreNotification::confirmed(Some(document)));
    }

    /// Sends a feed error to every subscriber.
    pub fn push_error(&self, error: StoreError) {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|tx| tx.send(Err(error.clone())).is_ok());
    }

    /// Ends every open change feed.
    pub fn close_subscriptions(&self) {
        self.lock().subscribers.clear();
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn set(&self, document: Value) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        if state.fail_writes {
            return Err(StoreError::Request("write rejected".to_string()));
        }

        state.previous = state.document.replace(document.clone());
        state.write_count += 1;
        debug!("[MemoryStore] Write #{} accepted", state.write_count);

        state.broadcast(StoreNotification::pending(document.clone()));
        state.broadcast(StoreNotification::confirmed(Some(document)));
        Ok(())
    }

    async fn get(&self) -> Result<Option<Value>, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        if state.stale_read_back {
            return Ok(state.previous.clone());
        }
        Ok(state.document.clone())
    }

    async fn subscribe(&self) -> Result<NotificationStream, StoreError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot, like a fresh listener on a hosted store.
        let _ = tx.send(Ok(StoreNotification::confirmed(state.document.clone())));
        state.subscribers.push(tx);
        Ok(notification_stream(rx))
    }
}
