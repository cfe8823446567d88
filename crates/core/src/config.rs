//! Engine configuration.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::planner::{default_roster, GroupSeed, TripWindow};

pub const DEFAULT_DOCUMENT_PATH: &str = "planner/main";
pub const DEFAULT_MIRROR_KEY: &str = "tripPlannerData";

const ENV_DOCUMENT_PATH: &str = "TRIPSYNC_DOCUMENT_PATH";
const ENV_LOCAL_MIRROR: &str = "TRIPSYNC_LOCAL_MIRROR";
const ENV_MIRROR_KEY: &str = "TRIPSYNC_MIRROR_KEY";
const ENV_TRIP_START: &str = "TRIPSYNC_TRIP_START";
const ENV_TRIP_END: &str = "TRIPSYNC_TRIP_END";

/// Address of the single shared document, `<collection>/<document>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath {
    collection: String,
    document: String,
}

impl DocumentPath {
    pub fn new(collection: &str, document: &str) -> Result<Self, ValidationError> {
        format!("{}/{}", collection, document).parse()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

impl Default for DocumentPath {
    fn default() -> Self {
        Self {
            collection: "planner".to_string(),
            document: "main".to_string(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.document)
    }
}

impl FromStr for DocumentPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidDocumentPath(s.to_string());
        let (collection, document) = s.trim().trim_matches('/').split_once('/').ok_or_else(invalid)?;
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_segment(collection) || !valid_segment(document) {
            return Err(invalid());
        }
        Ok(Self {
            collection: collection.to_string(),
            document: document.to_string(),
        })
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentPath> for String {
    fn from(value: DocumentPath) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub document_path: DocumentPath,
    pub local_mirror_enabled: bool,
    pub mirror_key: String,
    pub trip_window: Option<TripWindow>,
    pub roster: Vec<GroupSeed>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            document_path: DocumentPath::default(),
            local_mirror_enabled: false,
            mirror_key: DEFAULT_MIRROR_KEY.to_string(),
            trip_window: None,
            roster: default_roster(),
        }
    }
}

impl PlannerConfig {
    /// Reads overrides from the environment. Blank or invalid values fall
    /// back to the defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(raw) = read(ENV_DOCUMENT_PATH) {
            match raw.parse() {
                Ok(path) => config.document_path = path,
                Err(e) => warn!("[Config] Ignoring {}: {}", ENV_DOCUMENT_PATH, e),
            }
        }

        if let Some(raw) = read(ENV_LOCAL_MIRROR) {
            config.local_mirror_enabled = matches!(
                raw.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(key) = read(ENV_MIRROR_KEY) {
            config.mirror_key = key;
        }

        let parse_day = |key: &str| {
            read(key).and_then(|raw| match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!("[Config] Ignoring {}='{}': {}", key, raw, e);
                    None
                }
            })
        };
        if let (Some(start), Some(end)) = (parse_day(ENV_TRIP_START), parse_day(ENV_TRIP_END)) {
            match TripWindow::new(start, end) {
                Ok(window) => config.trip_window = Some(window),
                Err(e) => warn!("[Config] Ignoring trip window: {}", e),
            }
        }

        config
    }

    pub fn with_document_path(mut self, document_path: DocumentPath) -> Self {
        self.document_path = document_path;
        self
    }

    pub fn with_local_mirror(mut self, enabled: bool) -> Self {
        self.local_mirror_enabled = enabled;
        self
    }

    pub fn with_mirror_key(mut self, key: impl Into<String>) -> Self {
        self.mirror_key = key.into();
        self
    }

    pub fn with_trip_window(mut self, window: TripWindow) -> Self {
        self.trip_window = Some(window);
        self
    }

    pub fn with_roster(mut self, roster: Vec<GroupSeed>) -> Self {
        self.roster = roster;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PlannerConfig::default();
        assert_eq!(config.document_path.to_string(), DEFAULT_DOCUMENT_PATH);
        assert!(!config.local_mirror_enabled);
        assert_eq!(config.mirror_key, DEFAULT_MIRROR_KEY);
        assert_eq!(config.roster.len(), 3);
        assert!(config.trip_window.is_none());
    }

    #[test]
    fn env_overrides_are_trimmed() {
        let config = PlannerConfig::from_lookup(lookup(&[
            (ENV_DOCUMENT_PATH, " trips/japan "),
            (ENV_LOCAL_MIRROR, "TRUE"),
            (ENV_MIRROR_KEY, "   "),
            (ENV_TRIP_START, "2026-04-04"),
            (ENV_TRIP_END, "2026-04-18"),
        ]));
        assert_eq!(config.document_path.collection(), "trips");
        assert_eq!(config.document_path.document(), "japan");
        assert!(config.local_mirror_enabled);
        assert_eq!(config.mirror_key, DEFAULT_MIRROR_KEY);
        let window = config.trip_window.unwrap();
        assert_eq!(window.start(), NaiveDate::from_ymd_opt(2026, 4, 4).unwrap());
    }

    #[test]
    fn invalid_env_values_fall_back() {
        let config = PlannerConfig::from_lookup(lookup(&[
            (ENV_DOCUMENT_PATH, "no-slash"),
            (ENV_TRIP_START, "2026-04-18"),
            (ENV_TRIP_END, "2026-04-04"),
        ]));
        assert_eq!(config.document_path, DocumentPath::default());
        assert!(config.trip_window.is_none());
    }

    #[test]
    fn document_path_parsing() {
        assert!("planner/main".parse::<DocumentPath>().is_ok());
        assert!("a/b/c".parse::<DocumentPath>().is_err());
        assert!("/".parse::<DocumentPath>().is_err());
        assert!(DocumentPath::new("planner", "../etc").is_err());
    }
}
