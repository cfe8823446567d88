//! Bridges the remote store's change feed into the sync engine.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info};
use tokio::task::JoinHandle;

use super::planner_sync_engine::PlannerSyncEngine;
use super::planner_sync_model::NotificationDisposition;
use super::remote_store::StoreNotification;
use crate::errors::{PlannerError, Result};

pub struct SubscriptionBridge {
    engine: Arc<PlannerSyncEngine>,
}

impl SubscriptionBridge {
    pub fn new(engine: Arc<PlannerSyncEngine>) -> Self {
        Self { engine }
    }

    /// Routes one notification: pending echoes are skipped, an absent document
    /// falls back to the local mirror, anything else is reconciled.
    pub fn handle_notification(&self, notification: StoreNotification) -> NotificationDisposition {
        if notification.has_pending_writes {
            debug!("[Subscription] Skipping unconfirmed local write");
            return NotificationDisposition::PendingWriteSkipped;
        }
        match notification.snapshot {
            Some(snapshot) => NotificationDisposition::Reconciled(self.engine.reconcile(&snapshot)),
            None => {
                info!("[Subscription] Remote document missing, using local mirror");
                NotificationDisposition::MirrorFallback {
                    loaded: self.engine.load_local_mirror(),
                }
            }
        }
    }

    /// Consumes the change feed until it ends.
    ///
    /// A subscribe or feed failure puts the engine in read-only mode and is
    /// returned as [`PlannerError::Connectivity`].
    pub async fn run(self) -> Result<()> {
        let mut feed = match self.engine.store().subscribe().await {
            Ok(feed) => feed,
            Err(err) => return Err(self.connectivity_failure(err.to_string())),
        };
        info!("[Subscription] Listening for remote changes");

        while let Some(item) = feed.next().await {
            match item {
                Ok(notification) => {
                    self.handle_notification(notification);
                }
                Err(err) => return Err(self.connectivity_failure(err.to_string())),
            }
        }

        info!("[Subscription] Change feed closed");
        Ok(())
    }

    pub fn spawn(engine: Arc<PlannerSyncEngine>) -> JoinHandle<Result<()>> {
        tokio::spawn(Self::new(engine).run())
    }

    fn connectivity_failure(&self, message: String) -> PlannerError {
        self.engine
            .enter_read_only(format!("Failed to subscribe to server updates: {}", message));
        PlannerError::Connectivity(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::errors::StoreError;
    use crate::events::{BroadcastEventSink, PlannerEvent};
    use crate::planner::GroupSeed;
    use crate::sync::local_mirror::{InMemoryMirrorBackend, LocalMirror, MirrorBackend};
    use crate::sync::memory_store::InMemoryRemoteStore;
    use crate::sync::planner_sync_model::{ReconcileOutcome, SkipReason};
    use serde_json::json;

    fn config() -> PlannerConfig {
        PlannerConfig::default().with_roster(vec![
            GroupSeed::new("alpha", "Alpha"),
            GroupSeed::new("beta", "Beta"),
        ])
    }

    fn remote_doc(last_updated: i64, item: &str) -> serde_json::Value {
        json!({
            "groups": [{ "id": "alpha", "name": "Alpha", "packingList": [{ "text": item }] }],
            "lastUpdated": last_updated
        })
    }

    #[test]
    fn pending_writes_are_not_reconciled() {
        let engine = Arc::new(PlannerSyncEngine::new(config(), Arc::new(InMemoryRemoteStore::new())));
        let bridge = SubscriptionBridge::new(engine.clone());
        let disposition = bridge.handle_notification(StoreNotification::pending(remote_doc(10, "Hat")));
        assert_eq!(disposition, NotificationDisposition::PendingWriteSkipped);
        assert_eq!(engine.last_updated(), None);
    }

    #[test]
    fn confirmed_snapshot_goes_through_the_gate() {
        let engine = Arc::new(PlannerSyncEngine::new(config(), Arc::new(InMemoryRemoteStore::new())));
        let bridge = SubscriptionBridge::new(engine.clone());

        let first = bridge.handle_notification(StoreNotification::confirmed(Some(remote_doc(10, "Hat"))));
        assert!(matches!(
            first,
            NotificationDisposition::Reconciled(ReconcileOutcome::Applied { .. })
        ));
        let second = bridge.handle_notification(StoreNotification::confirmed(Some(remote_doc(10, "Cap"))));
        assert_eq!(
            second,
            NotificationDisposition::Reconciled(ReconcileOutcome::Ignored(
                SkipReason::StaleSnapshot {
                    local: Some(10),
                    remote: 10
                }
            ))
        );
        assert_eq!(engine.group("alpha").unwrap().packing_list[0].text, "Hat");
    }

    #[test]
    fn absent_document_falls_back_to_mirror() {
        let backend = Arc::new(InMemoryMirrorBackend::new());
        backend
            .write(
                "planner",
                &json!({ "groups": [{ "id": "beta", "name": "Beta Crew" }] }).to_string(),
            )
            .unwrap();
        let engine = Arc::new(
            PlannerSyncEngine::new(config(), Arc::new(InMemoryRemoteStore::new()))
                .with_local_mirror(LocalMirror::new(backend, "planner")),
        );
        let bridge = SubscriptionBridge::new(engine.clone());

        let disposition = bridge.handle_notification(StoreNotification::confirmed(None));
        assert_eq!(disposition, NotificationDisposition::MirrorFallback { loaded: true });
        assert_eq!(engine.group("beta").unwrap().name, "Beta Crew");
    }

    #[tokio::test]
    async fn unreachable_store_makes_engine_read_only() {
        let store = Arc::new(InMemoryRemoteStore::new());
        store.set_unavailable(true);
        let sink = Arc::new(BroadcastEventSink::new());
        let mut rx = sink.subscribe();
        let engine = Arc::new(PlannerSyncEngine::new(config(), store).with_event_sink(sink));

        let result = SubscriptionBridge::spawn(engine.clone()).await.unwrap();
        assert!(matches!(result, Err(PlannerError::Connectivity(_))));
        assert!(engine.is_read_only());
        assert!(matches!(
            rx.try_recv().unwrap(),
            PlannerEvent::ConnectivityLost { .. }
        ));
    }

    #[tokio::test]
    async fn remote_writes_flow_into_the_engine() {
        let store = Arc::new(InMemoryRemoteStore::with_document(remote_doc(10, "Hat")));
        let engine = Arc::new(PlannerSyncEngine::new(config(), store.clone()));
        let handle = SubscriptionBridge::spawn(engine.clone());
        tokio::task::yield_now().await;
        assert_eq!(engine.last_updated(), Some(10));

        store.push_remote(remote_doc(20, "Scarf"));
        store.close_subscriptions();
        let result = handle.await.unwrap();
        assert!(result.is_ok());

        assert_eq!(engine.last_updated(), Some(20));
        assert_eq!(engine.group("alpha").unwrap().packing_list[0].text, "Scarf");
    }

    #[tokio::test]
    async fn own_write_echo_does_not_reapply() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let engine = Arc::new(PlannerSyncEngine::new(config(), store.clone()));
        let handle = SubscriptionBridge::spawn(engine.clone());
        tokio::task::yield_now().await;

        engine.add_packing_item("alpha", "Passport").await.unwrap();
        let stamp = engine.last_updated();
        store.close_subscriptions();
        handle.await.unwrap().unwrap();

        assert_eq!(engine.last_updated(), stamp);
        assert_eq!(engine.group("alpha").unwrap().packing_list.len(), 1);
    }

    #[tokio::test]
    async fn feed_error_is_reported_as_connectivity_failure() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let engine = Arc::new(PlannerSyncEngine::new(config(), store.clone()));
        let handle = SubscriptionBridge::spawn(engine.clone());
        tokio::task::yield_now().await;

        store.push_error(StoreError::Unavailable("connection reset".to_string()));
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PlannerError::Connectivity(_))));
        assert!(engine.is_read_only());
    }
}
