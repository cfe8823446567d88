//! Activities planned by more than one group.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::calendar::format_short_date;
use super::model::{PlannerDocument, TimeOfDay};

/// One group's occurrence of a shared activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapEntry {
    pub group_id: String,
    pub group_name: String,
    pub date: NaiveDate,
    pub time: Option<TimeOfDay>,
    pub event_id: String,
}

/// Events sharing a normalized title across distinct groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedActivity {
    pub key: String,
    pub title: String,
    pub entries: Vec<OverlapEntry>,
}

impl SharedActivity {
    pub fn group_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.group_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

pub fn overlap_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Groups events by lowercase trimmed title and keeps the keys that more
/// than one group uses. Keys come back sorted; entries by date then time.
pub fn shared_overlaps(document: &PlannerDocument) -> Vec<SharedActivity> {
    let mut by_key: BTreeMap<String, SharedActivity> = BTreeMap::new();

    for group in &document.groups {
        for event in &group.events {
            let key = overlap_key(&event.title);
            if key.is_empty() {
                continue;
            }
            let activity = by_key.entry(key.clone()).or_insert_with(|| SharedActivity {
                key,
                title: event.title.trim().to_string(),
                entries: Vec::new(),
            });
            activity.entries.push(OverlapEntry {
                group_id: group.id.clone(),
                group_name: group.name.clone(),
                date: event.date,
                time: event.time,
                event_id: event.id.clone(),
            });
        }
    }

    by_key
        .into_values()
        .filter(|activity| activity.group_count() > 1)
        .map(|mut activity| {
            activity.entries.sort_by_key(|entry| (entry.date, entry.time));
            activity
        })
        .collect()
}

/// `"Alpha – Apr 4 at 10:00"`, or without the time part when untimed.
pub fn overlap_entry_label(entry: &OverlapEntry) -> String {
    let date = format_short_date(entry.date);
    match entry.time {
        Some(time) => format!("{} \u{2013} {} at {}", entry.group_name, date, time),
        None => format!("{} \u{2013} {}", entry.group_name, date),
    }
}
