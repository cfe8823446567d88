//! Date helpers consumed by the calendar and list views.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::{Event, TimeOfDay};
use crate::errors::ValidationError;

/// Inclusive date range of the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TripWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidTripWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn check(&self, date: NaiveDate) -> Result<(), ValidationError> {
        if self.contains(date) {
            Ok(())
        } else {
            Err(ValidationError::DateOutsideTrip {
                date,
                start: self.start,
                end: self.end,
            })
        }
    }

    /// First day (Sunday) of every calendar week the trip touches.
    pub fn week_starts(&self) -> Vec<NaiveDate> {
        let offset = u64::from(self.start.weekday().num_days_from_sunday());
        let mut cursor = self.start - Days::new(offset);
        let mut weeks = Vec::new();
        while cursor <= self.end {
            weeks.push(cursor);
            match cursor.checked_add_days(Days::new(7)) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        weeks
    }
}

/// `"Apr 4"`.
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// `"$12.50"`.
pub fn format_cost(cost: Decimal) -> String {
    format!("${:.2}", cost)
}

fn event_sort_key(event: &Event) -> (NaiveDate, Option<TimeOfDay>) {
    (event.date, event.time)
}

/// Events ordered by date, then time; untimed events lead their day.
pub fn sorted_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<&'a Event> {
    let mut sorted: Vec<&Event> = events.into_iter().collect();
    sorted.sort_by_key(|event| event_sort_key(event));
    sorted
}

pub fn events_by_date<'a>(
    events: impl IntoIterator<Item = &'a Event>,
) -> BTreeMap<NaiveDate, Vec<&'a Event>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Event>> = BTreeMap::new();
    for event in sorted_events(events) {
        by_date.entry(event.date).or_default().push(event);
    }
    by_date
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::EventCategory;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
    }

    fn event(title: &str, day: u32, time: Option<&str>) -> Event {
        let mut event = Event::new("group1", EventCategory::Activity, date(day), title).unwrap();
        event.time = time.map(|t| t.parse().unwrap());
        event
    }

    #[test]
    fn trip_window_rejects_reversed_range() {
        assert!(matches!(
            TripWindow::new(date(18), date(4)),
            Err(ValidationError::InvalidTripWindow { .. })
        ));
    }

    #[test]
    fn week_starts_cover_the_whole_trip() {
        // 2026-04-04 is a Saturday.
        let window = TripWindow::new(date(4), date(18)).unwrap();
        let weeks = window.week_starts();
        assert_eq!(
            weeks,
            vec![
                NaiveDate::from_ymd_opt(2026, 3, 29).unwrap(),
                date(5),
                date(12)
            ]
        );
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_short_date(date(4)), "Apr 4");
        assert_eq!(format_cost(dec!(12.5)), "$12.50");
        assert_eq!(format_cost(dec!(3)), "$3.00");
    }

    #[test]
    fn sorted_events_put_untimed_first() {
        let events = vec![
            event("Dinner", 5, Some("19:00")),
            event("Check-in", 5, None),
            event("Breakfast", 5, Some("08:15")),
            event("Arrival", 4, Some("22:30")),
        ];
        let titles: Vec<&str> = sorted_events(&events)
            .into_iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Arrival", "Check-in", "Breakfast", "Dinner"]);
    }

    #[test]
    fn events_grouped_by_date() {
        let events = vec![event("A", 6, None), event("B", 4, None), event("C", 6, None)];
        let grouped = events_by_date(&events);
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec![date(4), date(6)]);
        assert_eq!(grouped[&date(6)].len(), 2);
    }
}
