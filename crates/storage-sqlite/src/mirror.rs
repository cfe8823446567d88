//! SQLite backend for the planner's local mirror.

use std::sync::Arc;

use tripsync_core::errors::MirrorError;
use tripsync_core::sync::MirrorBackend;

use crate::db::DbPool;
use crate::kv_store::SqliteKeyValueStore;

pub const MIRROR_NAMESPACE: &str = "mirror";

pub struct SqliteMirrorBackend {
    store: SqliteKeyValueStore,
}

impl SqliteMirrorBackend {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            store: SqliteKeyValueStore::new(pool, MIRROR_NAMESPACE),
        }
    }
}

impl MirrorBackend for SqliteMirrorBackend {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.store.get(key)?)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        Ok(self.store.put(key, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init;
    use tripsync_core::planner::{GroupSeed, PackingItem, PlannerDocument};
    use tripsync_core::sync::LocalMirror;

    #[test]
    fn local_mirror_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.db");
        let path = path.to_str().unwrap();
        let roster = vec![GroupSeed::new("group1", "Group 1")];

        {
            let mirror = LocalMirror::new(Arc::new(SqliteMirrorBackend::new(init(path).unwrap())), "tripPlannerData");
            let mut doc = PlannerDocument::from_roster(&roster);
            doc.groups[0].packing_list.push(PackingItem::new("Rail pass").unwrap());
            mirror.save(&doc);
        }

        let mirror = LocalMirror::new(Arc::new(SqliteMirrorBackend::new(init(path).unwrap())), "tripPlannerData");
        let mut restored = PlannerDocument::from_roster(&roster);
        assert!(mirror.load(&mut restored));
        assert_eq!(restored.groups[0].packing_list[0].text, "Rail pass");
    }
}
