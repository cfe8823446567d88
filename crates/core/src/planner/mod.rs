//! Planner domain model.

pub mod calendar;
pub mod model;
pub mod overlaps;
pub mod roster;

pub use calendar::{events_by_date, format_cost, format_short_date, sorted_events, TripWindow};
pub use model::{
    new_entry_id, parse_cost, parse_date, ChecklistEntry, Event, EventCategory, EventDraft,
    EventLocation, Group, PackingItem, PlannerDocument, Task, TaskDraft, TimeOfDay,
};
pub use overlaps::{overlap_entry_label, overlap_key, shared_overlaps, OverlapEntry, SharedActivity};
pub use roster::{default_roster, group_color, GroupSeed, FALLBACK_GROUP_COLOR};
