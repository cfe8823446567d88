//! Planner synchronization: engine, remote store contract, subscription and local mirror.

mod local_mirror;
mod memory_store;
mod planner_sync_engine;
mod planner_sync_model;
mod remote_store;
mod subscription;
mod undo;

pub use local_mirror::*;
pub use memory_store::*;
pub use planner_sync_engine::*;
pub use planner_sync_model::*;
pub use remote_store::*;
pub use subscription::*;
pub use undo::*;
