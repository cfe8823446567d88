//! Tripsync core: planner domain model and the document sync engine.

pub mod config;
pub mod errors;
pub mod events;
pub mod planner;
pub mod sync;

pub use config::{DocumentPath, PlannerConfig};
pub use errors::{PersistenceError, PlannerError, Result, StoreError, ValidationError};
pub use events::{BroadcastEventSink, ChangeReason, PlannerEvent, PlannerEventSink};
pub use sync::{PlannerSyncEngine, RemoteStore, SubscriptionBridge};
