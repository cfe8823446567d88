//! SQLite persistence for tripsync: a namespaced key-value table backing the
//! local mirror and the document server.

pub mod db;
pub mod errors;
pub mod kv_store;
pub mod mirror;
pub mod schema;

pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool};
pub use errors::{Result, StorageError};
pub use kv_store::{KeyValueEntry, SqliteKeyValueStore};
pub use mirror::{SqliteMirrorBackend, MIRROR_NAMESPACE};
