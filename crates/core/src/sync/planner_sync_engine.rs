//! Planner sync engine.
//!
//! Owns the in-memory planner document. Every mutation is applied locally
//! first, mirrored, then written to the remote store and verified by reading
//! the document back. A failed write reverts exactly the mutation that
//! triggered it.
//!
//! The state lock is never held across an `.await`, so remote snapshots can
//! be reconciled while a write is still in flight. The `lastUpdated` gate
//! orders the two.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use serde_json::Value;

use super::local_mirror::LocalMirror;
use super::planner_sync_model::{
    next_write_timestamp, should_apply_snapshot, snapshot_last_updated, ReconcileOutcome,
    SkipReason, SyncEngineStatus,
};
use super::remote_store::RemoteStore;
use super::undo::UndoRecord;
use crate::config::PlannerConfig;
use crate::errors::{PersistenceError, PlannerError, Result, ValidationError};
use crate::events::{ChangeReason, NoOpPlannerEventSink, PlannerEvent, PlannerEventSink};
use crate::planner::{
    shared_overlaps, ChecklistEntry, Event, EventDraft, Group, PackingItem, PlannerDocument,
    SharedActivity, Task, TaskDraft,
};

struct EngineState {
    document: PlannerDocument,
    read_only: Option<String>,
    pending_writes: usize,
    last_error: Option<String>,
}

/// How a checklist entry is addressed by the caller.
#[derive(Debug, Clone, Copy)]
enum EntryRef<'a> {
    Index(usize),
    Id(&'a str),
}

/// The two positional checklists of a group.
trait Checklist {
    type Item: ChecklistEntry + Clone;
    const NAME: &'static str;

    fn items(group: &mut Group) -> &mut Vec<Self::Item>;
    fn remove_undo(group_id: String, entry_id: String) -> UndoRecord;
    fn restore_undo(group_id: String, index: usize, item: Self::Item) -> UndoRecord;
    fn checked_undo(group_id: String, entry_id: String, checked: bool) -> UndoRecord;
}

struct PackingList;

impl Checklist for PackingList {
    type Item = PackingItem;
    const NAME: &'static str = "packingList";

    fn items(group: &mut Group) -> &mut Vec<PackingItem> {
        &mut group.packing_list
    }

    fn remove_undo(group_id: String, item_id: String) -> UndoRecord {
        UndoRecord::RemovePackingItem { group_id, item_id }
    }

    fn restore_undo(group_id: String, index: usize, item: PackingItem) -> UndoRecord {
        UndoRecord::RestorePackingItem {
            group_id,
            index,
            item,
        }
    }

    fn checked_undo(group_id: String, item_id: String, checked: bool) -> UndoRecord {
        UndoRecord::SetPackingItemChecked {
            group_id,
            item_id,
            checked,
        }
    }
}

struct PreTripList;

impl Checklist for PreTripList {
    type Item = Task;
    const NAME: &'static str = "preTripList";

    fn items(group: &mut Group) -> &mut Vec<Task> {
        &mut group.pre_trip_list
    }

    fn remove_undo(group_id: String, task_id: String) -> UndoRecord {
        UndoRecord::RemoveTask { group_id, task_id }
    }

    fn restore_undo(group_id: String, index: usize, task: Task) -> UndoRecord {
        UndoRecord::RestoreTask {
            group_id,
            index,
            task,
        }
    }

    fn checked_undo(group_id: String, task_id: String, checked: bool) -> UndoRecord {
        UndoRecord::SetTaskChecked {
            group_id,
            task_id,
            checked,
        }
    }
}

fn group_mut<'a>(
    document: &'a mut PlannerDocument,
    group_id: &str,
) -> std::result::Result<&'a mut Group, ValidationError> {
    document
        .group_mut(group_id)
        .ok_or_else(|| ValidationError::UnknownGroup(group_id.to_string()))
}

fn resolve_entry<T: ChecklistEntry>(
    items: &[T],
    entry: EntryRef<'_>,
    group_id: &str,
    list: &'static str,
) -> std::result::Result<usize, ValidationError> {
    match entry {
        EntryRef::Index(index) if index < items.len() => Ok(index),
        EntryRef::Index(index) => Err(ValidationError::IndexOutOfRange {
            group_id: group_id.to_string(),
            list,
            index,
        }),
        EntryRef::Id(id) => items
            .iter()
            .position(|item| item.entry_id() == id)
            .ok_or_else(|| ValidationError::UnknownEntry {
                group_id: group_id.to_string(),
                list,
                entry_id: id.to_string(),
            }),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct PlannerSyncEngine {
    config: PlannerConfig,
    state: Mutex<EngineState>,
    store: Arc<dyn RemoteStore>,
    mirror: LocalMirror,
    events: Arc<dyn PlannerEventSink>,
}

impl PlannerSyncEngine {
    pub fn new(config: PlannerConfig, store: Arc<dyn RemoteStore>) -> Self {
        let document = PlannerDocument::from_roster(&config.roster);
        Self {
            config,
            state: Mutex::new(EngineState {
                document,
                read_only: None,
                pending_writes: 0,
                last_error: None,
            }),
            store,
            mirror: LocalMirror::disabled(),
            events: Arc::new(NoOpPlannerEventSink),
        }
    }

    pub fn with_local_mirror(mut self, mirror: LocalMirror) -> Self {
        self.mirror = mirror;
        self
    }

    /// Sets the sink that receives state-change and error notifications.
    pub fn with_event_sink(mut self, events: Arc<dyn PlannerEventSink>) -> Self {
        self.events = events;
        self
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Read accessors
    // ---------------------------------------------------------------------

    pub fn document(&self) -> PlannerDocument {
        self.lock().document.clone()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.lock().document.groups.clone()
    }

    pub fn group(&self, group_id: &str) -> Option<Group> {
        self.lock().document.group(group_id).cloned()
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.lock().document.last_updated
    }

    pub fn is_read_only(&self) -> bool {
        self.lock().read_only.is_some()
    }

    pub fn status(&self) -> SyncEngineStatus {
        let state = self.lock();
        SyncEngineStatus {
            last_updated: state.document.last_updated,
            read_only: state.read_only.is_some(),
            last_error: state.last_error.clone(),
            pending_writes: state.pending_writes,
        }
    }

    pub fn shared_overlaps(&self) -> Vec<SharedActivity> {
        shared_overlaps(&self.lock().document)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub async fn add_event(&self, group_id: &str, draft: EventDraft) -> Result<Event> {
        let event = draft.into_event(group_id, self.config.trip_window.as_ref())?;

        self.apply_and_commit(|doc| {
            let group = group_mut(doc, group_id)?;
            group.events.push(event.clone());
            let undo = UndoRecord::RemoveEvent {
                group_id: group_id.to_string(),
                event_id: event.id.clone(),
            };
            Ok((Some(undo), ()))
        })
        .await?;

        info!("[PlannerSync] Added event '{}' to group '{}'", event.title, group_id);
        Ok(event)
    }

    /// Removes the event with `event_id` from whichever group owns it.
    ///
    /// Returns `Ok(None)` without writing anything when no group has it.
    pub async fn delete_event(&self, event_id: &str) -> Result<Option<Event>> {
        let removed = self
            .apply_and_commit(|doc| {
                let Some(location) = doc.find_event(event_id) else {
                    return Ok((None, None));
                };
                let group = group_mut(doc, &location.group_id)?;
                let event = group.events.remove(location.index);
                let undo = UndoRecord::RestoreEvent {
                    group_id: location.group_id,
                    index: location.index,
                    event: event.clone(),
                };
                Ok((Some(undo), Some(event)))
            })
            .await?;

        if removed.is_none() {
            debug!("[PlannerSync] delete_event: '{}' not found", event_id);
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Packing list
    // ---------------------------------------------------------------------

    pub async fn add_packing_item(&self, group_id: &str, text: &str) -> Result<PackingItem> {
        let item = PackingItem::new(text)?;
        self.add_entry::<PackingList>(group_id, item).await
    }

    /// Flips the checked flag of the item at `index`. Returns the new value.
    pub async fn toggle_packing_item(&self, group_id: &str, index: usize) -> Result<bool> {
        self.toggle_entry::<PackingList>(group_id, EntryRef::Index(index))
            .await
    }

    pub async fn toggle_packing_item_by_id(&self, group_id: &str, item_id: &str) -> Result<bool> {
        self.toggle_entry::<PackingList>(group_id, EntryRef::Id(item_id))
            .await
    }

    pub async fn delete_packing_item(&self, group_id: &str, index: usize) -> Result<PackingItem> {
        self.delete_entry::<PackingList>(group_id, EntryRef::Index(index))
            .await
    }

    pub async fn delete_packing_item_by_id(
        &self,
        group_id: &str,
        item_id: &str,
    ) -> Result<PackingItem> {
        self.delete_entry::<PackingList>(group_id, EntryRef::Id(item_id))
            .await
    }

    // ---------------------------------------------------------------------
    // Pre-trip tasks
    // ---------------------------------------------------------------------

    pub async fn add_task(&self, group_id: &str, draft: TaskDraft) -> Result<Task> {
        let task = draft.into_task()?;
        self.add_entry::<PreTripList>(group_id, task).await
    }

    pub async fn toggle_task(&self, group_id: &str, index: usize) -> Result<bool> {
        self.toggle_entry::<PreTripList>(group_id, EntryRef::Index(index))
            .await
    }

    pub async fn toggle_task_by_id(&self, group_id: &str, task_id: &str) -> Result<bool> {
        self.toggle_entry::<PreTripList>(group_id, EntryRef::Id(task_id))
            .await
    }

    pub async fn delete_task(&self, group_id: &str, index: usize) -> Result<Task> {
        self.delete_entry::<PreTripList>(group_id, EntryRef::Index(index))
            .await
    }

    pub async fn delete_task_by_id(&self, group_id: &str, task_id: &str) -> Result<Task> {
        self.delete_entry::<PreTripList>(group_id, EntryRef::Id(task_id))
            .await
    }

    async fn add_entry<L: Checklist>(&self, group_id: &str, item: L::Item) -> Result<L::Item> {
        self.apply_and_commit(|doc| {
            let group = group_mut(doc, group_id)?;
            L::items(group).push(item.clone());
            let undo = L::remove_undo(group_id.to_string(), item.entry_id().to_string());
            Ok((Some(undo), ()))
        })
        .await?;
        Ok(item)
    }

    async fn toggle_entry<L: Checklist>(&self, group_id: &str, entry: EntryRef<'_>) -> Result<bool> {
        self.apply_and_commit(|doc| {
            let items = L::items(group_mut(doc, group_id)?);
            let index = resolve_entry(items, entry, group_id, L::NAME)?;
            let item = &mut items[index];
            let previous = item.is_checked();
            item.set_checked(!previous);
            let undo = L::checked_undo(group_id.to_string(), item.entry_id().to_string(), previous);
            Ok((Some(undo), !previous))
        })
        .await
    }

    async fn delete_entry<L: Checklist>(
        &self,
        group_id: &str,
        entry: EntryRef<'_>,
    ) -> Result<L::Item> {
        self.apply_and_commit(|doc| {
            let items = L::items(group_mut(doc, group_id)?);
            let index = resolve_entry(items, entry, group_id, L::NAME)?;
            let item = items.remove(index);
            let undo = L::restore_undo(group_id.to_string(), index, item.clone());
            Ok((Some(undo), item))
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Writes the whole document stamped with a fresh `lastUpdated` and
    /// verifies the stamp by reading it back. Returns the stamp.
    pub async fn persist(&self) -> Result<i64> {
        match self.persist_inner().await {
            Ok(stamp) => Ok(stamp),
            Err(err) => {
                self.report_persistence_failure(&err);
                Err(err.into())
            }
        }
    }

    async fn persist_inner(&self) -> std::result::Result<i64, PersistenceError> {
        let (payload, stamp, previous) = {
            let mut state = self.lock();
            if let Some(reason) = &state.read_only {
                let err = PersistenceError::StoreUnavailable(reason.clone());
                state.last_error = Some(err.to_string());
                return Err(err);
            }
            let previous = state.document.last_updated;
            let stamp = next_write_timestamp(now_millis(), previous);
            let payload = state.document.to_wire(stamp)?;
            // Claim the stamp before writing so the echo of this write is gated out.
            state.document.last_updated = Some(stamp);
            state.pending_writes += 1;
            (payload, stamp, previous)
        };

        let result = self.write_and_verify(payload, stamp).await;

        let mut state = self.lock();
        state.pending_writes = state.pending_writes.saturating_sub(1);
        match result {
            Ok(()) => {
                state.last_error = None;
                debug!("[PlannerSync] Persisted document at {}", stamp);
                Ok(stamp)
            }
            Err(err) => {
                if state.document.last_updated == Some(stamp) {
                    state.document.last_updated = previous;
                }
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn write_and_verify(
        &self,
        payload: Value,
        stamp: i64,
    ) -> std::result::Result<(), PersistenceError> {
        self.store.set(payload).await?;
        let read_back = self.store.get().await?;
        let actual = read_back.as_ref().and_then(snapshot_last_updated);
        if actual != Some(stamp) {
            return Err(PersistenceError::VerificationFailed {
                expected: stamp,
                actual,
            });
        }
        Ok(())
    }

    /// Applies a local mutation under the lock, mirrors it, then persists it.
    ///
    /// The mutation returns its undo record, or `None` when nothing changed,
    /// together with the caller's result.
    async fn apply_and_commit<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(
            &mut PlannerDocument,
        ) -> std::result::Result<(Option<UndoRecord>, T), ValidationError>,
    {
        let (undo, output) = {
            let mut state = self.lock();
            let applied = mutate(&mut state.document)?;
            if applied.0.is_some() {
                self.mirror.save(&state.document);
            }
            applied
        };
        if let Some(undo) = undo {
            self.events
                .emit(PlannerEvent::state_changed(ChangeReason::LocalMutation));
            self.commit(undo).await?;
        }
        Ok(output)
    }

    async fn commit(&self, undo: UndoRecord) -> Result<()> {
        match self.persist_inner().await {
            Ok(_) => {
                self.events
                    .emit(PlannerEvent::state_changed(ChangeReason::Persisted));
                Ok(())
            }
            Err(err) => {
                self.roll_back(undo);
                self.report_persistence_failure(&err);
                self.events
                    .emit(PlannerEvent::state_changed(ChangeReason::MutationRolledBack));
                Err(err.into())
            }
        }
    }

    fn roll_back(&self, undo: UndoRecord) {
        let mut state = self.lock();
        if !undo.apply(&mut state.document) {
            warn!("[PlannerSync] Rollback target no longer present; leaving state as is");
        }
        self.mirror.save(&state.document);
    }

    fn report_persistence_failure(&self, err: &PersistenceError) {
        error!("[PlannerSync] Persist failed: {}", err);
        self.events
            .emit(PlannerEvent::persistence_failed(err.to_string()));
    }

    // ---------------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------------

    /// Applies a remote snapshot if it passes the timestamp gate.
    pub fn reconcile(&self, snapshot: &Value) -> ReconcileOutcome {
        let Some(remote) = snapshot_last_updated(snapshot) else {
            debug!("[PlannerSync] Ignoring snapshot without lastUpdated");
            return ReconcileOutcome::Ignored(SkipReason::MissingTimestamp);
        };

        let groups_merged = {
            let mut state = self.lock();
            let local = state.document.last_updated;
            if !should_apply_snapshot(local, remote) {
                debug!(
                    "[PlannerSync] Ignoring stale snapshot (local={:?}, remote={})",
                    local, remote
                );
                return ReconcileOutcome::Ignored(SkipReason::StaleSnapshot { local, remote });
            }
            state.document.last_updated = Some(remote);
            let merged = state.document.merge_snapshot(snapshot);
            self.mirror.save(&state.document);
            merged
        };

        debug!(
            "[PlannerSync] Applied snapshot {} ({} groups)",
            remote, groups_merged
        );
        self.events
            .emit(PlannerEvent::state_changed(ChangeReason::RemoteSnapshot));
        ReconcileOutcome::Applied {
            last_updated: remote,
            groups_merged,
        }
    }

    /// Merges the locally mirrored state, if any. Used when the remote document does not exist.
    pub fn load_local_mirror(&self) -> bool {
        let loaded = {
            let mut state = self.lock();
            self.mirror.load(&mut state.document)
        };
        if loaded {
            info!("[PlannerSync] Restored planner from local mirror");
            self.events
                .emit(PlannerEvent::state_changed(ChangeReason::LocalMirrorLoaded));
        }
        loaded
    }

    /// Switches to accept-but-not-persist mode. Reported once.
    pub fn enter_read_only(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = self.lock();
            if state.read_only.is_some() {
                return;
            }
            state.read_only = Some(reason.clone());
            state.last_error = Some(reason.clone());
        }
        error!("[PlannerSync] Remote store unreachable, changes will not be saved: {}", reason);
        self.events.emit(PlannerEvent::connectivity_lost(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventSink;
    use crate::planner::{GroupSeed, TripWindow};
    use crate::sync::local_mirror::InMemoryMirrorBackend;
    use crate::errors::StoreError;
    use crate::sync::memory_store::InMemoryRemoteStore;
    use crate::sync::remote_store::NotificationStream;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::broadcast::Receiver;
    use tokio::sync::Notify;

    fn config() -> PlannerConfig {
        PlannerConfig::default().with_roster(vec![
            GroupSeed::new("alpha", "Alpha"),
            GroupSeed::new("beta", "Beta"),
        ])
    }

    fn engine() -> (Arc<InMemoryRemoteStore>, PlannerSyncEngine) {
        let store = Arc::new(InMemoryRemoteStore::new());
        let engine = PlannerSyncEngine::new(config(), store.clone());
        (store, engine)
    }

    fn engine_with_events() -> (Arc<InMemoryRemoteStore>, PlannerSyncEngine, Receiver<PlannerEvent>) {
        let (store, engine) = engine();
        let sink = Arc::new(BroadcastEventSink::new());
        let rx = sink.subscribe();
        (store, engine.with_event_sink(sink), rx)
    }

    fn draft(title: &str, date: &str) -> EventDraft {
        EventDraft {
            category: "activity".to_string(),
            date: date.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn drain(rx: &mut Receiver<PlannerEvent>) -> Vec<PlannerEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    #[tokio::test]
    async fn add_event_persists_whole_document() {
        let (store, engine) = engine();
        let event = engine
            .add_event("alpha", draft("Shrine Visit", "2026-04-05"))
            .await
            .unwrap();

        assert_eq!(store.write_count(), 1);
        let remote = store.document().unwrap();
        assert_eq!(remote["groups"][0]["events"][0]["id"], json!(event.id));
        assert_eq!(remote["groups"][0]["events"][0]["groupId"], json!("alpha"));
        assert_eq!(snapshot_last_updated(&remote), engine.last_updated());
        assert_eq!(engine.group("alpha").unwrap().events, vec![event]);
    }

    #[tokio::test]
    async fn add_then_delete_restores_collection() {
        let (_store, engine) = engine();
        engine
            .add_event("alpha", draft("Arrival", "2026-04-04"))
            .await
            .unwrap();
        let before = engine.group("alpha").unwrap().events;

        let added = engine
            .add_event("alpha", draft("Tea Ceremony", "2026-04-06"))
            .await
            .unwrap();
        let removed = engine.delete_event(&added.id).await.unwrap();

        assert_eq!(removed, Some(added));
        assert_eq!(engine.group("alpha").unwrap().events, before);
    }

    #[tokio::test]
    async fn delete_unknown_event_is_a_no_op() {
        let (store, engine) = engine();
        assert_eq!(engine.delete_event("missing").await.unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn validation_failure_touches_nothing() {
        let (store, engine, mut rx) = engine_with_events();
        let before = engine.document();

        let err = engine
            .add_event("alpha", draft("", "2026-04-05"))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = engine
            .add_event("nobody", draft("Ramen", "2026-04-05"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Validation(ValidationError::UnknownGroup(_))
        ));

        assert_eq!(engine.document(), before);
        assert_eq!(store.write_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn trip_window_is_enforced() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let window = TripWindow::new(
            NaiveDate::from_ymd_opt(2026, 4, 4).unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 18).unwrap(),
        )
        .unwrap();
        let engine = PlannerSyncEngine::new(config().with_trip_window(window), store);
        let err = engine
            .add_event("alpha", draft("Too Early", "2026-04-01"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Validation(ValidationError::DateOutsideTrip { .. })
        ));
    }

    #[tokio::test]
    async fn failed_write_rolls_back_added_event() {
        let (store, engine, mut rx) = engine_with_events();
        store.set_fail_writes(true);
        let before = engine.document();

        let err = engine
            .add_event("beta", draft("Karaoke", "2026-04-10"))
            .await
            .unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(engine.document(), before);

        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&PlannerEvent::state_changed(ChangeReason::LocalMutation))
        );
        assert!(matches!(events[1], PlannerEvent::PersistenceFailed { .. }));
        assert_eq!(
            events.last(),
            Some(&PlannerEvent::state_changed(ChangeReason::MutationRolledBack))
        );
        assert!(engine.status().last_error.is_some());
    }

    #[tokio::test]
    async fn failed_delete_reinserts_event_at_original_position() {
        let (store, engine) = engine();
        let mut ids = Vec::new();
        for (title, day) in [("A", "2026-04-05"), ("B", "2026-04-06"), ("C", "2026-04-07")] {
            ids.push(engine.add_event("alpha", draft(title, day)).await.unwrap().id);
        }
        let before = engine.document();

        store.set_fail_writes(true);
        assert!(engine.delete_event(&ids[1]).await.is_err());
        assert_eq!(engine.document(), before);
    }

    #[tokio::test]
    async fn stale_read_back_fails_and_restores_pre_write_document() {
        let (store, engine) = engine();
        engine
            .add_packing_item("alpha", "Passport")
            .await
            .unwrap();
        let before = engine.document();

        store.set_stale_read_back(true);
        let err = engine.persist().await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Persistence(PersistenceError::VerificationFailed { .. })
        ));
        assert_eq!(engine.document(), before);

        let err = engine
            .toggle_packing_item("alpha", 0)
            .await
            .unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(engine.document(), before);
    }

    #[tokio::test]
    async fn missing_read_back_is_a_verification_failure() {
        let (store, engine) = engine();
        store.set_stale_read_back(true);
        let err = engine.persist().await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Persistence(PersistenceError::VerificationFailed { actual: None, .. })
        ));
        assert_eq!(engine.last_updated(), None);
    }

    #[tokio::test]
    async fn packing_list_operations() {
        let (_store, engine) = engine();
        let first = engine.add_packing_item("alpha", " Passport ").await.unwrap();
        let second = engine.add_packing_item("alpha", "Charger").await.unwrap();
        assert_eq!(first.text, "Passport");

        assert!(engine.toggle_packing_item("alpha", 1).await.unwrap());
        assert!(!engine.toggle_packing_item_by_id("alpha", &second.id).await.unwrap());

        let removed = engine.delete_packing_item("alpha", 0).await.unwrap();
        assert_eq!(removed.id, first.id);
        let removed = engine
            .delete_packing_item_by_id("alpha", &second.id)
            .await
            .unwrap();
        assert_eq!(removed.id, second.id);
        assert!(engine.group("alpha").unwrap().packing_list.is_empty());
    }

    #[tokio::test]
    async fn checklist_errors_are_validation_errors() {
        let (store, engine) = engine();
        assert!(matches!(
            engine.toggle_packing_item("alpha", 0).await,
            Err(PlannerError::Validation(ValidationError::IndexOutOfRange { .. }))
        ));
        assert!(matches!(
            engine.delete_task_by_id("beta", "nope").await,
            Err(PlannerError::Validation(ValidationError::UnknownEntry { .. }))
        ));
        assert!(matches!(
            engine.add_packing_item("alpha", "   ").await,
            Err(PlannerError::Validation(ValidationError::EmptyText))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn task_operations_and_rollback() {
        let (store, engine) = engine();
        let task = engine
            .add_task("beta", TaskDraft::new("Buy JR pass").with_due_date("2026-03-15"))
            .await
            .unwrap();
        assert!(engine.toggle_task("beta", 0).await.unwrap());

        store.set_fail_writes(true);
        assert!(engine.delete_task("beta", 0).await.unwrap_err().is_persistence());
        assert!(engine
            .toggle_task_by_id("beta", &task.id)
            .await
            .unwrap_err()
            .is_persistence());

        let tasks = engine.group("beta").unwrap().pre_trip_list;
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].checked);
        assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2026, 3, 15));
    }

    #[tokio::test]
    async fn paid_event_never_carries_cost() {
        let (store, engine) = engine();
        let mut d = draft("Ryokan", "2026-04-06");
        d.cost = Some("250.00".to_string());
        d.paid = true;
        let event = engine.add_event("alpha", d).await.unwrap();
        assert_eq!(event.cost, None);
        let remote = store.document().unwrap();
        assert!(remote["groups"][0]["events"][0].get("cost").is_none());

        let mut d = draft("Dinner", "2026-04-06");
        d.cost = Some("30.5".to_string());
        let event = engine.add_event("alpha", d).await.unwrap();
        assert_eq!(event.cost, Some(dec!(30.5)));
    }

    fn snapshot(last_updated: i64, alpha_events: Value) -> Value {
        json!({
            "groups": [
                { "id": "alpha", "name": "Alpha", "events": alpha_events, "packingList": [], "preTripList": [] },
                { "id": "beta", "name": "Beta", "events": [], "packingList": [{ "text": "Hat" }], "preTripList": [] }
            ],
            "lastUpdated": last_updated
        })
    }

    #[test]
    fn reconcile_gate_scenario() {
        let (_store, engine) = engine();
        let applied = engine.reconcile(&snapshot(1000, json!([])));
        assert!(applied.is_applied());
        assert_eq!(engine.last_updated(), Some(1000));
        let at_1000 = engine.document();

        let stale = engine.reconcile(&snapshot(
            900,
            json!([{ "id": "x", "type": "food", "date": "2026-04-05", "title": "Old" }]),
        ));
        assert_eq!(
            stale,
            ReconcileOutcome::Ignored(SkipReason::StaleSnapshot {
                local: Some(1000),
                remote: 900
            })
        );
        assert_eq!(engine.document(), at_1000);

        let newer = engine.reconcile(&snapshot(
            1500,
            json!([{ "id": "y", "type": "food", "date": "2026-04-05", "title": "New" }]),
        ));
        assert_eq!(
            newer,
            ReconcileOutcome::Applied {
                last_updated: 1500,
                groups_merged: 2
            }
        );
        assert_eq!(engine.last_updated(), Some(1500));
        assert_eq!(engine.group("alpha").unwrap().events[0].title, "New");
        assert_eq!(engine.group("beta").unwrap().packing_list[0].text, "Hat");
    }

    #[test]
    fn reconcile_equal_timestamp_is_ignored() {
        let (_store, engine) = engine();
        engine.reconcile(&snapshot(1000, json!([])));
        let again = engine.reconcile(&snapshot(
            1000,
            json!([{ "id": "z", "type": "food", "date": "2026-04-05", "title": "Echo" }]),
        ));
        assert!(!again.is_applied());
        assert!(engine.group("alpha").unwrap().events.is_empty());

        assert!(engine.reconcile(&snapshot(1001, json!([]))).is_applied());
    }

    #[test]
    fn reconcile_without_timestamp_is_ignored() {
        let (_store, engine) = engine();
        let outcome = engine.reconcile(&json!({ "groups": [] }));
        assert_eq!(outcome, ReconcileOutcome::Ignored(SkipReason::MissingTimestamp));
    }

    #[test]
    fn reconcile_never_changes_group_ids() {
        let (_store, engine) = engine();
        engine.reconcile(&json!({
            "groups": [
                { "id": "gamma", "name": "Gamma" },
                { "id": "alpha", "name": 42, "events": "oops" }
            ],
            "lastUpdated": 10
        }));
        let ids: Vec<String> = engine.groups().into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(engine.group("alpha").unwrap().name, "Alpha");
    }

    #[tokio::test]
    async fn reconcile_emits_state_changed() {
        let (_store, engine, mut rx) = engine_with_events();
        engine.reconcile(&snapshot(5, json!([])));
        engine.reconcile(&snapshot(4, json!([])));
        assert_eq!(
            drain(&mut rx),
            vec![PlannerEvent::state_changed(ChangeReason::RemoteSnapshot)]
        );
    }

    #[tokio::test]
    async fn writes_are_stamped_past_newer_remote_timestamps() {
        let (store, engine) = engine();
        let far_future = now_millis() + 60_000;
        engine.reconcile(&snapshot(far_future, json!([])));
        let stamp = engine.persist().await.unwrap();
        assert_eq!(stamp, far_future + 1);
        assert_eq!(snapshot_last_updated(&store.document().unwrap()), Some(far_future + 1));
    }

    #[tokio::test]
    async fn read_only_engine_rolls_back_every_mutation() {
        let (store, engine, mut rx) = engine_with_events();
        engine.enter_read_only("subscribe failed");
        engine.enter_read_only("subscribe failed again");
        assert!(engine.is_read_only());

        let err = engine.add_packing_item("alpha", "Hat").await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Persistence(PersistenceError::StoreUnavailable(_))
        ));
        assert!(engine.group("alpha").unwrap().packing_list.is_empty());
        assert_eq!(store.write_count(), 0);

        let connectivity: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, PlannerEvent::ConnectivityLost { .. }))
            .collect();
        assert_eq!(connectivity.len(), 1);
    }

    #[tokio::test]
    async fn mutations_write_through_the_local_mirror() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let backend = Arc::new(InMemoryMirrorBackend::new());
        let mirror = LocalMirror::new(backend.clone(), "planner");
        let engine = PlannerSyncEngine::new(config(), store.clone()).with_local_mirror(mirror.clone());

        engine.add_packing_item("beta", "Umbrella").await.unwrap();
        assert!(backend.raw("planner").unwrap().contains("Umbrella"));

        store.set_fail_writes(true);
        assert!(engine.add_packing_item("beta", "Poncho").await.is_err());
        let raw = backend.raw("planner").unwrap();
        assert!(!raw.contains("Poncho"));

        let fresh = PlannerSyncEngine::new(config(), Arc::new(InMemoryRemoteStore::new()))
            .with_local_mirror(mirror);
        assert!(fresh.load_local_mirror());
        assert_eq!(fresh.group("beta").unwrap().packing_list[0].text, "Umbrella");
    }

    #[tokio::test]
    async fn engines_are_independent() {
        let (_s1, first) = engine();
        let (_s2, second) = engine();
        first.add_packing_item("alpha", "Camera").await.unwrap();
        assert!(second.group("alpha").unwrap().packing_list.is_empty());
    }

    #[tokio::test]
    async fn shared_overlaps_reflect_engine_state() {
        let (_store, engine) = engine();
        engine
            .add_event("alpha", draft("Shrine Visit", "2026-04-05"))
            .await
            .unwrap();
        engine
            .add_event("beta", draft("shrine visit", "2026-04-08"))
            .await
            .unwrap();
        let overlaps = engine.shared_overlaps();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].key, "shrine visit");
        assert_eq!(overlaps[0].entries.len(), 2);
    }

    #[tokio::test]
    async fn confirmed_write_is_announced() {
        let (_store, engine, mut rx) = engine_with_events();
        engine.add_packing_item("alpha", "Passport").await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                PlannerEvent::state_changed(ChangeReason::LocalMutation),
                PlannerEvent::state_changed(ChangeReason::Persisted),
            ]
        );
    }

    /// Holds every `set` until the test releases it.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryRemoteStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteStore for GatedStore {
        async fn set(&self, document: Value) -> std::result::Result<(), StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.set(document).await
        }

        async fn get(&self) -> std::result::Result<Option<Value>, StoreError> {
            self.inner.get().await
        }

        async fn subscribe(&self) -> std::result::Result<NotificationStream, StoreError> {
            self.inner.subscribe().await
        }
    }

    fn alpha_packing_snapshot(last_updated: i64, items: Value) -> Value {
        json!({
            "groups": [{ "id": "alpha", "name": "Alpha", "packingList": items }],
            "lastUpdated": last_updated
        })
    }

    #[tokio::test]
    async fn snapshot_older_than_in_flight_write_is_ignored() {
        let store = Arc::new(GatedStore::default());
        let engine = Arc::new(PlannerSyncEngine::new(config(), store.clone()));
        engine.reconcile(&alpha_packing_snapshot(1000, json!([])));

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add_packing_item("alpha", "Passport").await })
        };
        store.entered.notified().await;
        let claimed = engine.last_updated().unwrap();
        assert!(claimed > 1500);

        let outcome = engine.reconcile(&alpha_packing_snapshot(
            1500,
            json!([{ "id": "old", "text": "Sunscreen" }]),
        ));
        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored(SkipReason::StaleSnapshot {
                local: Some(claimed),
                remote: 1500
            })
        );

        store.release.notify_one();
        let item = pending.await.unwrap().unwrap();
        assert_eq!(engine.last_updated(), Some(claimed));
        let packing = engine.group("alpha").unwrap().packing_list;
        assert_eq!(packing.len(), 1);
        assert_eq!(packing[0].id, item.id);
    }

    #[tokio::test]
    async fn newer_snapshot_during_failed_write_survives_rollback() {
        let store = Arc::new(GatedStore::default());
        store.inner.set_fail_writes(true);
        let engine = Arc::new(PlannerSyncEngine::new(config(), store.clone()));
        engine.reconcile(&alpha_packing_snapshot(1000, json!([])));

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add_packing_item("alpha", "Passport").await })
        };
        store.entered.notified().await;
        let claimed = engine.last_updated().unwrap();
        let passport_id = engine.group("alpha").unwrap().packing_list[0].id.clone();

        let remote_stamp = claimed + 10;
        let outcome = engine.reconcile(&alpha_packing_snapshot(
            remote_stamp,
            json!([
                { "id": "remote-1", "text": "Sunscreen" },
                { "id": passport_id, "text": "Passport" }
            ]),
        ));
        assert!(outcome.is_applied());

        store.release.notify_one();
        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_persistence());

        // The newer remote stamp is not rewound to the pre-write value.
        assert_eq!(engine.last_updated(), Some(remote_stamp));
        // The rollback removed the failed item by id from the replaced list.
        let packing = engine.group("alpha").unwrap().packing_list;
        assert_eq!(packing.len(), 1);
        assert_eq!(packing[0].id, "remote-1");
        assert_eq!(packing[0].text, "Sunscreen");
    }
}
