//! Planner entities and their wire/storage shapes.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::calendar::TripWindow;
use super::roster::GroupSeed;
use crate::errors::ValidationError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Generates a new, time-ordered identifier for events and checklist entries.
pub fn new_entry_id() -> String {
    Uuid::now_v7().to_string()
}

/// Fixed set of itinerary categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Flight,
    Lodging,
    Activity,
    Commute,
    Food,
    Exploration,
}

impl EventCategory {
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Flight,
        EventCategory::Lodging,
        EventCategory::Activity,
        EventCategory::Commute,
        EventCategory::Food,
        EventCategory::Exploration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Flight => "flight",
            EventCategory::Lodging => "lodging",
            EventCategory::Activity => "activity",
            EventCategory::Commute => "commute",
            EventCategory::Food => "food",
            EventCategory::Exploration => "exploration",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventCategory::Flight => "Flight",
            EventCategory::Lodging => "Lodging",
            EventCategory::Activity => "Activity",
            EventCategory::Commute => "Commute",
            EventCategory::Food => "Food",
            EventCategory::Exploration => "Exploration",
        }
    }

    /// Display colour used by calendar and list views.
    pub fn color(&self) -> &'static str {
        match self {
            EventCategory::Flight => "#e17055",
            EventCategory::Lodging => "#0984e3",
            EventCategory::Activity => "#00b894",
            EventCategory::Commute => "#fdcb6e",
            EventCategory::Food => "#fab1a0",
            EventCategory::Exploration => "#55efc4",
        }
    }

    pub fn icon_path(&self) -> &'static str {
        match self {
            EventCategory::Flight => "images/icon_flight.png",
            EventCategory::Lodging => "images/icon_lodging.png",
            EventCategory::Activity => "images/icon_activity.png",
            EventCategory::Commute => "images/icon_commute.png",
            EventCategory::Food => "images/icon_food.png",
            EventCategory::Exploration => "images/icon_exploration.png",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        EventCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Time of day quantized to 15-minute slots, serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const SLOT_MINUTES: u8 = 15;

    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 || minute % Self::SLOT_MINUTES != 0 {
            return Err(ValidationError::InvalidTime(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Every selectable slot of the day, in order.
    pub fn all_slots() -> Vec<TimeOfDay> {
        (0..24u8)
            .flat_map(|hour| {
                (0..60u8)
                    .step_by(Self::SLOT_MINUTES as usize)
                    .map(move |minute| TimeOfDay { hour, minute })
            })
            .collect()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let (hh, mm) = s.trim().split_once(':').ok_or_else(invalid)?;
        let is_two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !is_two_digits(hh) || !is_two_digits(mm) {
            return Err(invalid());
        }
        let hour = hh.parse::<u8>().map_err(|_| invalid())?;
        let minute = mm.parse::<u8>().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// A dated itinerary entry.
///
/// `cost` and `paid = true` are mutually exclusive; every constructor and
/// decoder in this module clears the cost of a paid event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub category: EventCategory,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeOfDay>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub group_id: String,
}

impl Event {
    pub fn new(
        group_id: &str,
        category: EventCategory,
        date: NaiveDate,
        title: &str,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        Ok(Self {
            id: new_entry_id(),
            category,
            date,
            time: None,
            title: title.to_string(),
            details: None,
            cost: None,
            paid: false,
            group_id: group_id.to_string(),
        })
    }

    /// Marks the event paid or unpaid. Paying clears any cost.
    pub fn set_paid(&mut self, paid: bool) {
        self.paid = paid;
        if paid {
            self.cost = None;
        }
    }

    /// Sets the cost. Ignored for paid events.
    pub fn set_cost(&mut self, cost: Option<Decimal>) -> Result<(), ValidationError> {
        if let Some(value) = cost {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ValidationError::NegativeCost);
            }
        }
        if !self.paid {
            self.cost = cost;
        }
        Ok(())
    }

    /// Re-establishes invariants on records decoded from untrusted input.
    pub fn normalize(&mut self) {
        if self.paid {
            self.cost = None;
        }
        if self.details.as_deref().is_some_and(|d| d.trim().is_empty()) {
            self.details = None;
        }
    }
}

/// Raw values submitted by the event form.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub category: String,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub paid: bool,
}

impl EventDraft {
    /// Validates the draft and builds an event with a fresh identifier.
    pub fn into_event(
        self,
        group_id: &str,
        trip_window: Option<&TripWindow>,
    ) -> Result<Event, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let date = parse_date(&self.date)?.ok_or(ValidationError::MissingDate)?;
        if let Some(window) = trip_window {
            window.check(date)?;
        }
        let category: EventCategory = self.category.parse()?;
        let time = non_empty(self.time)
            .map(|raw| raw.parse::<TimeOfDay>())
            .transpose()?;
        let cost = if self.paid {
            None
        } else {
            non_empty(self.cost)
                .map(|raw| parse_cost(&raw))
                .transpose()?
        };

        Ok(Event {
            id: new_entry_id(),
            category,
            date,
            time,
            title: title.to_string(),
            details: non_empty(self.details),
            cost,
            paid: self.paid,
            group_id: group_id.to_string(),
        })
    }
}

/// Parses a non-negative monetary amount such as `"12.50"`.
pub fn parse_cost(raw: &str) -> Result<Decimal, ValidationError> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|_| ValidationError::InvalidCost(raw.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::NegativeCost);
    }
    Ok(value)
}

/// Parses an ISO 8601 calendar date. Blank input yields `None`.
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map(Some)
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Entries of the positional checklists, addressable by a stable id.
pub trait ChecklistEntry {
    fn entry_id(&self) -> &str;
    fn is_checked(&self) -> bool;
    fn set_checked(&mut self, checked: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingItem {
    #[serde(default = "new_entry_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

impl PackingItem {
    pub fn new(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        Ok(Self {
            id: new_entry_id(),
            text: text.to_string(),
            checked: false,
        })
    }
}

impl ChecklistEntry for PackingItem {
    fn entry_id(&self) -> &str {
        &self.id
    }

    fn is_checked(&self) -> bool {
        self.checked
    }

    fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
    }
}

/// Pre-trip checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "new_entry_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl ChecklistEntry for Task {
    fn entry_id(&self) -> &str {
        &self.id
    }

    fn is_checked(&self) -> bool {
        self.checked
    }

    fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub text: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            due_date: None,
        }
    }

    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    pub fn into_task(self) -> Result<Task, ValidationError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let due_date = match self.due_date {
            Some(raw) => parse_date(&raw)?,
            None => None,
        };
        Ok(Task {
            id: new_entry_id(),
            text: text.to_string(),
            checked: false,
            due_date,
        })
    }
}

/// One planning unit with its own itinerary and checklists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub packing_list: Vec<PackingItem>,
    #[serde(default)]
    pub pre_trip_list: Vec<Task>,
}

impl Group {
    pub fn from_seed(seed: &GroupSeed) -> Self {
        Self {
            id: seed.id.clone(),
            name: seed.name.clone(),
            events: Vec::new(),
            packing_list: Vec::new(),
            pre_trip_list: Vec::new(),
        }
    }
}

/// Where an event lives inside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLocation {
    pub group_id: String,
    pub index: usize,
}

/// The single unit of remote persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerDocument {
    pub groups: Vec<Group>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

#[derive(Serialize)]
struct MirrorPayload<'a> {
    groups: &'a [Group],
}

impl PlannerDocument {
    pub fn from_roster(roster: &[GroupSeed]) -> Self {
        Self {
            groups: roster.iter().map(Group::from_seed).collect(),
            last_updated: None,
        }
    }

    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn group_mut(&mut self, group_id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == group_id)
    }

    pub fn group_ids(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.id.as_str()).collect()
    }

    /// Scans every group's events for the given identifier.
    pub fn find_event(&self, event_id: &str) -> Option<EventLocation> {
        self.groups.iter().find_map(|group| {
            group
                .events
                .iter()
                .position(|event| event.id == event_id)
                .map(|index| EventLocation {
                    group_id: group.id.clone(),
                    index,
                })
        })
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.all_events().find(|e| e.id == event_id)
    }

    /// Every group's events in roster order; the shared itinerary view.
    pub fn all_events(&self) -> impl Iterator<Item = &Event> {
        self.groups.iter().flat_map(|g| g.events.iter())
    }

    /// Serializes the full document stamped with `last_updated`.
    pub fn to_wire(&self, last_updated: i64) -> Result<Value, serde_json::Error> {
        let groups = serde_json::to_value(&self.groups)?;
        Ok(serde_json::json!({ "groups": groups, "lastUpdated": last_updated }))
    }

    /// Recognised fields only, without a timestamp.
    pub fn to_mirror_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(MirrorPayload {
            groups: &self.groups,
        })
    }

    /// Replaces each known group's name and collections with the snapshot's.
    ///
    /// Group ids and roster membership never change. Missing or non-array
    /// collections become empty; entries that fail to decode are dropped.
    /// Returns the number of groups merged.
    pub fn merge_snapshot(&mut self, snapshot: &Value) -> usize {
        let Some(saved_groups) = snapshot.get("groups").and_then(Value::as_array) else {
            return 0;
        };

        let mut merged = 0;
        for saved in saved_groups {
            let Some(group_id) = saved.get("id").and_then(Value::as_str) else {
                continue;
            };
            let Some(current) = self.group_mut(group_id) else {
                continue;
            };

            if let Some(name) = saved
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
            {
                current.name = name.to_string();
            }

            current.events = decode_collection(saved.get("events"), group_id, "events");
            for event in current.events.iter_mut() {
                event.group_id = group_id.to_string();
                event.normalize();
            }
            current.packing_list =
                decode_collection(saved.get("packingList"), group_id, "packingList");
            current.pre_trip_list =
                decode_collection(saved.get("preTripList"), group_id, "preTripList");
            merged += 1;
        }
        merged
    }
}

fn decode_collection<T: DeserializeOwned>(
    value: Option<&Value>,
    group_id: &str,
    field: &str,
) -> Vec<T> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(
                    "[Planner] Dropping malformed {} entry in group '{}': {}",
                    field, group_id, err
                );
                None
            }
        })
        .collect()
}
