//! Connection pool and migrations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::errors::{Result, StorageError};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const POOL_MAX_SIZE: u32 = 8;
const CONNECTION_TIMEOUT_SECS: u64 = 10;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = get_connection(pool)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!("[Storage] Applied {} migration(s)", applied.len());
    }
    Ok(())
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get()?)
}

/// Creates the parent directory, opens the pool and migrates the schema.
pub fn init(db_path: &str) -> Result<Arc<DbPool>> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let pool = create_pool(db_path)?;
    run_migrations(&pool)?;
    info!("[Storage] Database ready at {}", db_path);
    Ok(pool)
}
