//! Static group roster.

use serde::{Deserialize, Serialize};

/// Colour used for groups outside the known roster.
pub const FALLBACK_GROUP_COLOR: &str = "#b2bec3";

/// Identity of a group fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSeed {
    pub id: String,
    pub name: String,
}

impl GroupSeed {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub fn default_roster() -> Vec<GroupSeed> {
    vec![
        GroupSeed::new("group1", "Group 1"),
        GroupSeed::new("group2", "Group 2"),
        GroupSeed::new("group3", "Group 3"),
    ]
}

/// Display colour for a group, keyed by its id.
pub fn group_color(group_id: &str) -> &'static str {
    match group_id {
        "group1" => "#6c5ce7",
        "group2" => "#d63031",
        "group3" => "#00b894",
        _ => FALLBACK_GROUP_COLOR,
    }
}
