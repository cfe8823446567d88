//! Planner sync decisions and status models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lightweight sync engine status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_updated: Option<i64>,
    pub read_only: bool,
    pub last_error: Option<String>,
    pub pending_writes: usize,
}

/// Why a remote snapshot was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipReason {
    MissingTimestamp,
    StaleSnapshot { local: Option<i64>, remote: i64 },
}

/// Result of reconciling one remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileOutcome {
    Applied {
        last_updated: i64,
        groups_merged: usize,
    },
    Ignored(SkipReason),
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// What the subscription bridge did with a store notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDisposition {
    /// Echo of a write the store has not confirmed yet.
    PendingWriteSkipped,
    /// Document absent remotely; local mirror consulted.
    MirrorFallback { loaded: bool },
    Reconciled(ReconcileOutcome),
}

/// Timestamp gate for incoming snapshots.
///
/// Rule: the snapshot wins only when its `lastUpdated` is strictly greater
/// than the last-known value. Equal timestamps are treated as our own echo.
pub fn should_apply_snapshot(local_last_updated: Option<i64>, remote_last_updated: i64) -> bool {
    match local_last_updated {
        Some(local) => remote_last_updated > local,
        None => true,
    }
}

/// Reads `lastUpdated` from a raw snapshot. Integral floats are accepted.
pub fn snapshot_last_updated(snapshot: &Value) -> Option<i64> {
    let raw = snapshot.get("lastUpdated")?;
    raw.as_i64().or_else(|| {
        raw.as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

/// Timestamp to stamp a write with: wall clock, but always past the last-known value.
pub fn next_write_timestamp(now_ms: i64, last_known: Option<i64>) -> i64 {
    match last_known {
        Some(last) if last >= now_ms => last.saturating_add(1),
        _ => now_ms,
    }
}

/// Exponential backoff in milliseconds with cap.
pub fn backoff_millis(consecutive_failures: u32) -> u64 {
    const MAX_EXPONENT: u32 = 6;
    const BASE_DELAY_MILLIS: u64 = 500;

    2_u64.pow(consecutive_failures.min(MAX_EXPONENT)) * BASE_DELAY_MILLIS
}
