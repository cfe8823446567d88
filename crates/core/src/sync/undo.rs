//! Undo records for optimistic mutations.
//!
//! Each local mutation yields the record that reverts it. The record is
//! applied only when the write that carried the mutation fails.

use crate::planner::{ChecklistEntry, Event, PackingItem, PlannerDocument, Task};

#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    RemoveEvent {
        group_id: String,
        event_id: String,
    },
    RestoreEvent {
        group_id: String,
        index: usize,
        event: Event,
    },
    RemovePackingItem {
        group_id: String,
        item_id: String,
    },
    RestorePackingItem {
        group_id: String,
        index: usize,
        item: PackingItem,
    },
    SetPackingItemChecked {
        group_id: String,
        item_id: String,
        checked: bool,
    },
    RemoveTask {
        group_id: String,
        task_id: String,
    },
    RestoreTask {
        group_id: String,
        index: usize,
        task: Task,
    },
    SetTaskChecked {
        group_id: String,
        task_id: String,
        checked: bool,
    },
}

impl UndoRecord {
    /// Reverts the mutation. Returns `false` when the target is gone, for
    /// example because a remote snapshot replaced the collection meanwhile.
    pub fn apply(self, document: &mut PlannerDocument) -> bool {
        match self {
            UndoRecord::RemoveEvent { group_id, event_id } => document
                .group_mut(&group_id)
                .map(|g| remove_by_id(&mut g.events, &event_id, |e| &e.id))
                .unwrap_or(false),
            UndoRecord::RestoreEvent {
                group_id,
                index,
                event,
            } => {
                if document.find_event(&event.id).is_some() {
                    return false;
                }
                match document.group_mut(&group_id) {
                    Some(group) => restore_at(&mut group.events, index, event),
                    None => false,
                }
            }
            UndoRecord::RemovePackingItem { group_id, item_id } => document
                .group_mut(&group_id)
                .map(|g| remove_by_id(&mut g.packing_list, &item_id, |i| &i.id))
                .unwrap_or(false),
            UndoRecord::RestorePackingItem {
                group_id,
                index,
                item,
            } => match document.group_mut(&group_id) {
                Some(group) if !group.packing_list.iter().any(|i| i.id == item.id) => {
                    restore_at(&mut group.packing_list, index, item)
                }
                _ => false,
            },
            UndoRecord::SetPackingItemChecked {
                group_id,
                item_id,
                checked,
            } => document
                .group_mut(&group_id)
                .map(|g| set_checked(&mut g.packing_list, &item_id, checked))
                .unwrap_or(false),
            UndoRecord::RemoveTask { group_id, task_id } => document
                .group_mut(&group_id)
                .map(|g| remove_by_id(&mut g.pre_trip_list, &task_id, |t| &t.id))
                .unwrap_or(false),
            UndoRecord::RestoreTask {
                group_id,
                index,
                task,
            } => match document.group_mut(&group_id) {
                Some(group) if !group.pre_trip_list.iter().any(|t| t.id == task.id) => {
                    restore_at(&mut group.pre_trip_list, index, task)
                }
                _ => false,
            },
            UndoRecord::SetTaskChecked {
                group_id,
                task_id,
                checked,
            } => document
                .group_mut(&group_id)
                .map(|g| set_checked(&mut g.pre_trip_list, &task_id, checked))
                .unwrap_or(false),
        }
    }
}

fn remove_by_id<T>(items: &mut Vec<T>, id: &str, id_of: impl Fn(&T) -> &String) -> bool {
    match items.iter().position(|item| id_of(item) == id) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

fn restore_at<T>(items: &mut Vec<T>, index: usize, item: T) -> bool {
    let index = index.min(items.len());
    items.insert(index, item);
    true
}

fn set_checked<T: ChecklistEntry>(items: &mut [T], id: &str, checked: bool) -> bool {
    match items.iter_mut().find(|item| item.entry_id() == id) {
        Some(item) => {
            item.set_checked(checked);
            true
        }
        None => false,
    }
}
