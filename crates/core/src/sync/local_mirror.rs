//! Optional write-through copy of the planner in a local key-value store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use serde_json::Value;

use crate::config::PlannerConfig;
use crate::errors::MirrorError;
use crate::planner::PlannerDocument;

/// Key-value storage the mirror writes through to.
pub trait MirrorBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError>;
    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError>;
}

#[derive(Default)]
pub struct InMemoryMirrorBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryMirrorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }
}

impl MirrorBackend for InMemoryMirrorBackend {
    fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Local cache of the recognised planner fields. Never authoritative.
#[derive(Clone)]
pub struct LocalMirror {
    backend: Option<Arc<dyn MirrorBackend>>,
    key: String,
}

impl LocalMirror {
    pub fn disabled() -> Self {
        Self {
            backend: None,
            key: String::new(),
        }
    }

    pub fn new(backend: Arc<dyn MirrorBackend>, key: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            key: key.into(),
        }
    }

    /// Enabled only when the config asks for it.
    pub fn from_config(config: &PlannerConfig, backend: Arc<dyn MirrorBackend>) -> Self {
        if config.local_mirror_enabled {
            Self::new(backend, config.mirror_key.clone())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Merges the stored snapshot into `document`. Returns whether anything was merged.
    pub fn load(&self, document: &mut PlannerDocument) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match self.read_snapshot(backend.as_ref()) {
            Ok(Some(snapshot)) => {
                let merged = document.merge_snapshot(&snapshot);
                debug!("[LocalMirror] Loaded {} groups from '{}'", merged, self.key);
                merged > 0
            }
            Ok(None) => false,
            Err(e) => {
                error!("[LocalMirror] Failed to load '{}': {}", self.key, e);
                false
            }
        }
    }

    pub fn save(&self, document: &PlannerDocument) {
        let Some(backend) = &self.backend else {
            return;
        };
        let result = document
            .to_mirror_value()
            .map_err(MirrorError::from)
            .and_then(|value| {
                let raw = serde_json::to_string(&value)?;
                backend.write(&self.key, &raw)
            });
        if let Err(e) = result {
            error!("[LocalMirror] Failed to save '{}': {}", self.key, e);
        }
    }

    fn read_snapshot(&self, backend: &dyn MirrorBackend) -> Result<Option<Value>, MirrorError> {
        let Some(raw) = backend.read(&self.key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => Ok(Some(value)),
            Ok(_) => {
                warn!("[LocalMirror] Ignoring non-object payload under '{}'", self.key);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{GroupSeed, PackingItem};

    fn roster() -> Vec<GroupSeed> {
        vec![GroupSeed::new("alpha", "Alpha"), GroupSeed::new("beta", "Beta")]
    }

    struct FailingBackend;

    impl MirrorBackend for FailingBackend {
        fn read(&self, _key: &str) -> Result<Option<String>, MirrorError> {
            Err(MirrorError::Storage("disk gone".to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), MirrorError> {
            Err(MirrorError::Storage("disk gone".to_string()))
        }
    }

    #[test]
    fn save_then_load_restores_recognised_fields() {
        let backend = Arc::new(InMemoryMirrorBackend::new());
        let mirror = LocalMirror::new(backend.clone(), "planner");

        let mut original = PlannerDocument::from_roster(&roster());
        original.last_updated = Some(42);
        original.groups[0].name = "Alpha Crew".to_string();
        original.groups[1]
            .packing_list
            .push(PackingItem::new("Sunscreen").unwrap());
        mirror.save(&original);

        let stored = backend.raw("planner").unwrap();
        assert!(!stored.contains("lastUpdated"));

        let mut restored = PlannerDocument::from_roster(&roster());
        assert!(mirror.load(&mut restored));
        assert_eq!(restored.groups, original.groups);
        assert_eq!(restored.last_updated, None);
    }

    #[test]
    fn disabled_mirror_is_a_no_op() {
        let mirror = LocalMirror::disabled();
        let mut doc = PlannerDocument::from_roster(&roster());
        mirror.save(&doc);
        assert!(!mirror.load(&mut doc));
        assert!(!mirror.is_enabled());
    }

    #[test]
    fn from_config_respects_flag() {
        let backend: Arc<dyn MirrorBackend> = Arc::new(InMemoryMirrorBackend::new());
        let off = LocalMirror::from_config(&PlannerConfig::default(), backend.clone());
        assert!(!off.is_enabled());
        let on = LocalMirror::from_config(&PlannerConfig::default().with_local_mirror(true), backend);
        assert!(on.is_enabled());
    }

    #[test]
    fn malformed_payload_is_treated_as_empty() {
        let backend = Arc::new(InMemoryMirrorBackend::new());
        backend.write("planner", "{not json").unwrap();
        let mirror = LocalMirror::new(backend.clone(), "planner");
        let mut doc = PlannerDocument::from_roster(&roster());
        assert!(!mirror.load(&mut doc));

        backend.write("planner", "[1,2,3]").unwrap();
        assert!(!mirror.load(&mut doc));
        assert_eq!(doc, PlannerDocument::from_roster(&roster()));
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let mirror = LocalMirror::new(Arc::new(FailingBackend), "planner");
        let mut doc = PlannerDocument::from_roster(&roster());
        mirror.save(&doc);
        assert!(!mirror.load(&mut doc));
    }
}
