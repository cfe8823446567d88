//! Namespaced key-value table.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;

use crate::db::{get_connection, DbPool};
use crate::errors::Result;
use crate::schema::kv_entries;

#[derive(Queryable, Insertable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::kv_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KeyValueEntry {
    pub namespace: String,
    pub entry_key: String,
    pub value: String,
    pub updated_at: String,
}

/// Key-value access scoped to one namespace.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: Arc<DbPool>,
    namespace: String,
}

impl SqliteKeyValueStore {
    pub fn new(pool: Arc<DbPool>, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = kv_entries::table
            .filter(kv_entries::namespace.eq(self.namespace.as_str()))
            .filter(kv_entries::entry_key.eq(key))
            .select(kv_entries::value)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(value)
    }

    /// Inserts or overwrites `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        let entry = KeyValueEntry {
            namespace: self.namespace.clone(),
            entry_key: key.to_string(),
            value: value.to_string(),
            updated_at: now.clone(),
        };
        diesel::insert_into(kv_entries::table)
            .values(&entry)
            .on_conflict((kv_entries::namespace, kv_entries::entry_key))
            .do_update()
            .set((
                kv_entries::value.eq(value),
                kv_entries::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let deleted = diesel::delete(
            kv_entries::table
                .filter(kv_entries::namespace.eq(self.namespace.as_str()))
                .filter(kv_entries::entry_key.eq(key)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    /// All entries of the namespace, ordered by key.
    pub fn list(&self) -> Result<Vec<KeyValueEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let entries = kv_entries::table
            .filter(kv_entries::namespace.eq(self.namespace.as_str()))
            .order(kv_entries::entry_key.asc())
            .select(KeyValueEntry::as_select())
            .load::<KeyValueEntry>(&mut conn)?;
        Ok(entries)
    }
}
