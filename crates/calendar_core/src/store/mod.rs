//! Event store contract and its two backing variants.
//!
//! # Responsibility
//! - Define the storage contract consumed by the application service and
//!   the scheduler.
//! - Provide an in-memory variant and a SQLite-backed variant with
//!   identical semantics.
//! - Select the variant at startup from configuration.
//!
//! # Invariants
//! - `id` is unique across the whole store at all times.
//! - `add_event` checks and inserts as one indivisible step.
//! - Callers only ever receive copies of stored events.
//! - Stores carry no business rules beyond the filters named here.
//! - Timestamps keep full nanosecond precision in every variant; events with
//!   timestamps outside the storable window are rejected by every variant.

use crate::config::{StorageConfig, StorageKind};
use crate::db::DbError;
use crate::model::event::{DateRange, Event, EventId, OwnerId};
use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod memory;
mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::{SqliteEventStore, SqliteLocation};

pub type StoreResult<T> = Result<T, StoreError>;

/// Events keyed by id, as returned by list queries.
pub type EventMap = HashMap<EventId, Event>;

/// Storage error shared by every event store variant.
#[derive(Debug)]
pub enum StoreError {
    /// Insert targeted an id that is already stored.
    AlreadyExists(EventId),
    /// Mutation targeted an id that is not stored.
    NotFound(EventId),
    /// The backing resource is not open.
    NotConnected,
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists(_) => f.write_str("event already exist"),
            Self::NotFound(_) => f.write_str("event not found"),
            Self::NotConnected => f.write_str("event store is not connected"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage contract for calendar events.
///
/// Implementations are shared between long-lived tasks, so every method
/// takes `&self` and handles its own synchronization.
pub trait EventStore: Send + Sync {
    /// Opens (or reinitializes) the backing resource.
    fn connect(&self) -> StoreResult<()>;

    /// Releases the backing resource.
    fn close(&self) -> StoreResult<()>;

    /// Inserts `event`, failing with `AlreadyExists` when its id is taken.
    ///
    /// Fails with `InvalidData` when a timestamp is outside the storable window.
    fn add_event(&self, event: &Event) -> StoreResult<()>;

    /// Replaces the event stored under `id`, failing with `NotFound` when absent.
    ///
    /// Every field is overwritten, `notified` included. The stored copy always
    /// keeps `id` as its identifier.
    fn change_event(&self, id: EventId, event: &Event) -> StoreResult<()>;

    /// Deletes the event stored under `id`, failing with `NotFound` when absent.
    fn remove_event(&self, id: EventId) -> StoreResult<()>;

    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// Returns every event whose `start` or `end` lies inside `range`
    /// (inclusive). Events spanning the whole range are not returned.
    fn list_events_by_range(&self, range: &DateRange) -> StoreResult<EventMap>;

    fn list_events_by_owner(&self, owner_id: OwnerId) -> StoreResult<EventMap>;

    /// Returns every event with `notify_at <= now` that is not yet notified.
    fn list_events_for_notification(&self, now: DateTime<Utc>) -> StoreResult<EventMap>;

    /// Marks one event as notified, failing with `NotFound` when absent.
    fn set_is_notified(&self, id: EventId) -> StoreResult<()>;

    /// Deletes every event whose `end` is strictly before `cutoff`.
    ///
    /// Returns the number of removed events.
    fn remove_old_events(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}

/// Checks that every timestamp of `event` fits the storable window.
///
/// Timestamps are persisted as signed 64-bit nanoseconds since the Unix
/// epoch, which spans roughly the years 1677 to 2262.
pub(crate) fn check_storable(event: &Event) -> StoreResult<()> {
    let timestamps = [
        ("start", Some(event.start)),
        ("end", Some(event.end)),
        ("notify_at", event.notify_at),
    ];
    for (field, at) in timestamps {
        if let Some(at) = at.filter(|at| at.timestamp_nanos_opt().is_none()) {
            return Err(StoreError::InvalidData(format!(
                "{field} timestamp {at} is outside the storable range"
            )));
        }
    }
    Ok(())
}

/// Builds and connects the store variant selected by `config`.
///
/// # Errors
/// - Returns `StoreError::Db` when the SQLite database cannot be opened or migrated.
pub fn open_event_store(config: &StorageConfig) -> StoreResult<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.kind {
        StorageKind::Memory => Arc::new(MemoryEventStore::new()),
        StorageKind::Sqlite => {
            let location = match &config.path {
                Some(path) => SqliteLocation::File(path.clone()),
                None => SqliteLocation::Memory,
            };
            Arc::new(SqliteEventStore::new(location))
        }
    };

    store.connect()?;
    info!(
        "event=store_open module=store status=ok kind={}",
        config.kind.as_str()
    );
    Ok(store)
}
