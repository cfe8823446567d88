//! HTTP client for the tripsync document store.
//!
//! Implements the core `RemoteStore` contract on top of the REST API served
//! by `tripsync-server`: full-document PUT, point GET, and a long-poll
//! change feed for subscriptions.

mod client;
mod error;
mod types;

pub use client::{DocumentClientConfig, DocumentStoreClient};
pub use error::{ApiRetryClass, DocumentStoreError, Result};
pub use types::*;
