//! SQLite-backed event store.
//!
//! # Responsibility
//! - Persist events in the `events` table with parameterized queries.
//! - Mirror the in-memory filter semantics exactly, nothing more.
//!
//! # Invariants
//! - Timestamps are stored as UTC epoch nanoseconds, so values read back
//!   compare exactly like the ones written.
//! - Uniqueness on insert is enforced by the primary key in the same
//!   statement that inserts.
//! - Read paths reject invalid persisted rows instead of masking them.

use super::{check_storable, EventMap, EventStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::model::event::{DateRange, Event, EventId, OwnerId};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, Params, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const NANOS_PER_SEC: i64 = 1_000_000_000;

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    title,
    datetime_start,
    datetime_end,
    description,
    user_id,
    when_to_notify,
    is_notified
FROM events";

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    File(PathBuf),
    /// Private in-memory database, discarded on close.
    Memory,
}

/// Event store persisted in SQLite.
///
/// The connection is opened by `connect` and dropped by `close`; every
/// operation in between is serialized through one mutex.
pub struct SqliteEventStore {
    location: SqliteLocation,
    conn: Mutex<Option<Connection>>,
}

impl SqliteEventStore {
    /// Creates a disconnected store. Call `connect` before use.
    pub fn new(location: SqliteLocation) -> Self {
        Self {
            location,
            conn: Mutex::new(None),
        }
    }

    /// Creates and connects a store backed by the given database file.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(SqliteLocation::File(path.into()));
        store.connect()?;
        Ok(store)
    }

    /// Creates and connects a store backed by a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self::new(SqliteLocation::Memory);
        store.connect()?;
        Ok(store)
    }

    pub fn location(&self) -> &SqliteLocation {
        &self.location
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        op(conn)
    }

    fn query_events(&self, filter: &str, params: impl Params) -> StoreResult<EventMap> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{EVENT_SELECT_SQL} WHERE {filter};"))?;
            let mut rows = stmt.query(params)?;
            let mut events = EventMap::new();

            while let Some(row) = rows.next()? {
                let event = parse_event_row(row)?;
                events.insert(event.id, event);
            }

            Ok(events)
        })
    }
}

impl EventStore for SqliteEventStore {
    fn connect(&self) -> StoreResult<()> {
        let conn = match &self.location {
            SqliteLocation::File(path) => open_db(path)?,
            SqliteLocation::Memory => open_db_in_memory()?,
        };
        *self.lock() = Some(conn);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        if let Some(conn) = self.lock().take() {
            conn.close().map_err(|(_, err)| StoreError::from(err))?;
            info!("event=store_close module=store status=ok kind=sqlite");
        }
        Ok(())
    }

    fn add_event(&self, event: &Event) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_storable(event)?;
            let inserted = conn.execute(
                "INSERT INTO events (
                    id,
                    title,
                    datetime_start,
                    datetime_end,
                    description,
                    user_id,
                    when_to_notify,
                    is_notified
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (id) DO NOTHING;",
                params![
                    event.id.to_string(),
                    event.title.as_str(),
                    to_db_nanos(event.start),
                    to_db_nanos(event.end),
                    event.description.as_deref(),
                    event.owner_id.to_string(),
                    event.notify_at.map(to_db_nanos),
                    event.notified,
                ],
            )?;

            if inserted == 0 {
                return Err(StoreError::AlreadyExists(event.id));
            }
            Ok(())
        })
    }

    fn change_event(&self, id: EventId, event: &Event) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_storable(event)?;
            let changed = conn.execute(
                "UPDATE events
                 SET
                    title = ?1,
                    datetime_start = ?2,
                    datetime_end = ?3,
                    description = ?4,
                    user_id = ?5,
                    when_to_notify = ?6,
                    is_notified = ?7
                 WHERE id = ?8;",
                params![
                    event.title.as_str(),
                    to_db_nanos(event.start),
                    to_db_nanos(event.end),
                    event.description.as_deref(),
                    event.owner_id.to_string(),
                    event.notify_at.map(to_db_nanos),
                    event.notified,
                    id.to_string(),
                ],
            )?;

            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    fn remove_event(&self, id: EventId) -> StoreResult<()> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM events WHERE id = ?1;", [id.to_string()])?;
            if removed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let mut events = self.query_events("id = ?1", [id.to_string()])?;
        Ok(events.remove(&id))
    }

    fn list_events_by_range(&self, range: &DateRange) -> StoreResult<EventMap> {
        self.query_events(
            "(datetime_start >= ?1 AND datetime_start <= ?2)
                OR (datetime_end >= ?1 AND datetime_end <= ?2)",
            params![to_db_nanos(range.start), to_db_nanos(range.end)],
        )
    }

    fn list_events_by_owner(&self, owner_id: OwnerId) -> StoreResult<EventMap> {
        self.query_events("user_id = ?1", [owner_id.to_string()])
    }

    fn list_events_for_notification(&self, now: DateTime<Utc>) -> StoreResult<EventMap> {
        self.query_events(
            "when_to_notify IS NOT NULL AND when_to_notify <= ?1 AND is_notified = 0",
            [to_db_nanos(now)],
        )
    }

    fn set_is_notified(&self, id: EventId) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE events SET is_notified = 1 WHERE id = ?1;",
                [id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    fn remove_old_events(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM events WHERE datetime_end < ?1;",
                [to_db_nanos(cutoff)],
            )?;
            Ok(removed)
        })
    }
}

fn parse_event_row(row: &Row<'_>) -> StoreResult<Event> {
    let id = parse_uuid(row, "id")?;
    let owner_id = parse_uuid(row, "user_id")?;

    let notify_at = match row.get::<_, Option<i64>>("when_to_notify")? {
        Some(nanos) => Some(from_db_nanos(nanos, "when_to_notify")?),
        None => None,
    };

    let notified = match row.get::<_, i64>("is_notified")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_notified value `{other}` in events.is_notified"
            )));
        }
    };

    Ok(Event {
        id,
        title: row.get("title")?,
        start: from_db_nanos(row.get("datetime_start")?, "datetime_start")?,
        end: from_db_nanos(row.get("datetime_end")?, "datetime_end")?,
        description: row.get("description")?,
        owner_id,
        notify_at,
        notified,
    })
}

fn parse_uuid(row: &Row<'_>, column: &str) -> StoreResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{text}` in events.{column}"))
    })
}

/// Converts a timestamp to epoch nanoseconds.
///
/// Stored events are checked by `check_storable` first. Query bounds past
/// either end of the window clamp to `i64::MIN`/`i64::MAX`, which keeps the
/// comparison against stored values unchanged.
fn to_db_nanos(value: DateTime<Utc>) -> i64 {
    value.timestamp_nanos_opt().unwrap_or(if value.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn from_db_nanos(nanos: i64, column: &str) -> StoreResult<DateTime<Utc>> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::<Utc>::from_timestamp(secs, subsec).ok_or_else(|| {
        StoreError::InvalidData(format!("timestamp `{nanos}` out of range in events.{column}"))
    })
}
