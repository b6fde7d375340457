//! Event use-case service.
//!
//! # Responsibility
//! - Parse and validate primitive string input into `Event` values.
//! - Delegate every mutation and query to an `EventStore`.
//!
//! # Invariants
//! - Parse failures name the offending field (`bad start date`, ...).
//! - Store errors are returned unchanged.
//! - The service never bypasses the store's contracts.

use crate::model::event::{DateRange, Event, EventId, OwnerId};
use crate::store::{EventMap, EventStore, StoreError};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Underlying parse failure of a rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    Timestamp(chrono::ParseError),
    Identifier(uuid::Error),
}

impl Display for ParseFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp(err) => write!(f, "{err}"),
            Self::Identifier(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ParseFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Timestamp(err) => Some(err),
            Self::Identifier(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum ServiceError {
    /// Malformed input; `field` is the prefix reported to callers.
    Validation {
        field: &'static str,
        source: ParseFailure,
    },
    Store(StoreError),
}

impl ServiceError {
    /// Returns the field prefix for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            Self::Store(_) => None,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { field, source } => write!(f, "{field}: {source}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Primitive event input as received from a transport layer.
///
/// Timestamps are RFC 3339, identifiers are hyphenated UUIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventInput {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    /// Empty means no description.
    pub description: String,
    pub owner_id: String,
    /// Empty means never notify.
    pub notify_at: String,
}

/// Application facade over an event store.
pub struct EventService<S: EventStore + ?Sized> {
    store: Arc<S>,
}

impl<S: EventStore + ?Sized> EventService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates an event; fails with `event already exist` when the id is taken.
    pub fn create_event(&self, input: &EventInput) -> ServiceResult<EventId> {
        let event = build_event(input)?;
        self.store.add_event(&event)?;
        Ok(event.id)
    }

    /// Fully replaces an existing event.
    ///
    /// The replacement starts un-notified, so a rescheduled reminder fires again.
    pub fn update_event(&self, input: &EventInput) -> ServiceResult<()> {
        let event = build_event(input)?;
        self.store.change_event(event.id, &event)?;
        Ok(())
    }

    pub fn delete_event(&self, id: &str) -> ServiceResult<()> {
        let id = parse_id(id, "bad id")?;
        self.store.remove_event(id)?;
        Ok(())
    }

    pub fn get_event(&self, id: &str) -> ServiceResult<Option<Event>> {
        let id = parse_id(id, "bad id")?;
        Ok(self.store.get_event(id)?)
    }

    /// Returns events starting or ending inside `[start, end]`.
    pub fn find_events_by_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<EventMap> {
        Ok(self
            .store
            .list_events_by_range(&DateRange::new(start, end))?)
    }

    pub fn find_events_by_owner(&self, owner_id: &str) -> ServiceResult<EventMap> {
        let owner_id: OwnerId = parse_id(owner_id, "bad user id")?;
        Ok(self.store.list_events_by_owner(owner_id)?)
    }
}

/// Parses primitive input into an event. `start <= end` is not checked.
pub fn build_event(input: &EventInput) -> ServiceResult<Event> {
    let start = parse_timestamp(&input.start, "bad start date")?;
    let end = parse_timestamp(&input.end, "bad end date")?;
    let id = parse_id(&input.id, "bad id")?;
    let owner_id = parse_id(&input.owner_id, "bad user id")?;
    let notify_at = if input.notify_at.is_empty() {
        None
    } else {
        Some(parse_timestamp(&input.notify_at, "bad when date")?)
    };

    let mut event = Event::with_id(id, input.title.clone(), start, end, owner_id);
    event.description = Some(input.description.clone()).filter(|text| !text.is_empty());
    event.notify_at = notify_at;
    Ok(event)
}

fn parse_timestamp(value: &str, field: &'static str) -> ServiceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| ServiceError::Validation {
            field,
            source: ParseFailure::Timestamp(err),
        })
}

fn parse_id(value: &str, field: &'static str) -> ServiceResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| ServiceError::Validation {
        field,
        source: ParseFailure::Identifier(err),
    })
}
