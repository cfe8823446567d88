//! Planner notifications consumed by the presentation layer.
//!
//! The engine emits a [`PlannerEvent::StateChanged`] when a mutation is
//! applied locally and again once its write has either been confirmed or
//! rolled back, plus after every accepted reconciliation or mirror load.
//! Views re-render on it and on nothing else.

use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeReason {
    LocalMutation,
    /// The write carrying a local mutation was confirmed by the store.
    Persisted,
    MutationRolledBack,
    RemoteSnapshot,
    LocalMirrorLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlannerEvent {
    StateChanged { reason: ChangeReason },
    /// A write was rolled back. Shown to the user as a transient error.
    PersistenceFailed { message: String },
    /// Raised once when the store cannot be reached; the engine is read-only afterwards.
    ConnectivityLost { message: String },
}

impl PlannerEvent {
    pub fn state_changed(reason: ChangeReason) -> Self {
        Self::StateChanged { reason }
    }

    pub fn persistence_failed(message: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            message: message.into(),
        }
    }

    pub fn connectivity_lost(message: impl Into<String>) -> Self {
        Self::ConnectivityLost {
            message: message.into(),
        }
    }
}

/// Receiver of planner notifications.
pub trait PlannerEventSink: Send + Sync {
    fn emit(&self, event: PlannerEvent);
}

/// Sink that discards everything. Default for engines built without one.
pub struct NoOpPlannerEventSink;

impl PlannerEventSink for NoOpPlannerEventSink {
    fn emit(&self, _event: PlannerEvent) {}
}

/// Fans planner notifications out to any number of subscribers.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<PlannerEvent>,
}

impl BroadcastEventSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerEventSink for BroadcastEventSink {
    fn emit(&self, event: PlannerEvent) {
        // No receivers is fine: nobody is rendering yet.
        let _ = self.sender.send(event);
    }
}
