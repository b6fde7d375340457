//! Event domain model.
//!
//! # Responsibility
//! - Define the canonical calendar event record and its JSON wire shape.
//! - Provide the range filter shared by every store variant.
//!
//! # Invariants
//! - `id` is stable and never reused for another event.
//! - `notified` starts as `false` and flips to `true` once a notification
//!   has been handed to the queue.
//! - `start <= end` is not enforced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a calendar event.
pub type EventId = Uuid;

/// Identifier of the user owning an event. Not checked against any user table.
pub type OwnerId = Uuid;

/// Canonical calendar event.
///
/// Serialized with camelCase field names; this is also the queue payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: OwnerId,
    /// `None` means the event never fires a notification.
    #[serde(default)]
    pub notify_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notified: bool,
}

impl Event {
    /// Creates an event with a generated id, no description and no notification.
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        owner_id: OwnerId,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), title, start, end, owner_id)
    }

    /// Creates an event with a caller-provided id.
    pub fn with_id(
        id: EventId,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        owner_id: OwnerId,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            start,
            end,
            description: None,
            owner_id,
            notify_at: None,
            notified: false,
        }
    }

    /// Returns whether this event matches a range query.
    ///
    /// An event matches when its `start` or its `end` lies inside the
    /// inclusive range. An event that starts before the range and ends after
    /// it does not match.
    pub fn matches_range(&self, range: &DateRange) -> bool {
        range.contains(self.start) || range.contains(self.end)
    }

    /// Returns whether a notification for this event is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.notified && self.notify_at.is_some_and(|at| at <= now)
    }
}

/// Inclusive timestamp pair used only as a query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::{DateRange, Event};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample() -> Event {
        Event::new(
            "standup",
            Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2009, 11, 10, 23, 15, 0).unwrap(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let event = sample();
        let range = DateRange::new(event.end, event.end + chrono::Duration::hours(1));
        assert!(event.matches_range(&range));
    }

    #[test]
    fn containing_event_is_not_matched() {
        let event = sample();
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2009, 11, 10, 23, 5, 0).unwrap(),
            Utc.with_ymd_and_hms(2009, 11, 10, 23, 10, 0).unwrap(),
        );
        assert!(!event.matches_range(&range));
    }

    #[test]
    fn due_requires_notify_time_and_unnotified_flag() {
        let mut event = sample();
        let now = Utc::now();
        assert!(!event.is_due(now));

        event.notify_at = Some(now);
        assert!(event.is_due(now));

        event.notified = true;
        assert!(!event.is_due(now));
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let mut event = sample();
        event.description = Some("daily sync".to_string());
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("ownerId").is_some());
        assert!(json.get("notifyAt").is_some());
        assert_eq!(json["description"], "daily sync");
    }
}
