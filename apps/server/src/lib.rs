//! Tripsync document server: one JSON document per path, full overwrite,
//! point read and a long-poll change feed.

pub mod api;
pub mod error;
pub mod hub;
pub mod main_lib;

pub use main_lib::{app_router, build_state, AppState, ServerConfig};
