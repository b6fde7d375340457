//! Schema history of the `events` table.
//!
//! # Responsibility
//! - List every change to the calendar schema, oldest first.
//! - Bring an older calendar database up to date in one transaction.
//!
//! # Invariants
//! - Step numbers only grow; a shipped step is never edited.
//! - The highest applied step is mirrored to `PRAGMA user_version`.
//! - Step 3 rescales stored timestamps from milliseconds to nanoseconds.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One schema step of the calendar database.
#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_events.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_event_indexes.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("0003_event_timestamps_nanos.sql"),
    },
];

/// Returns the calendar schema version this build writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Upgrades the calendar database behind `conn` to `latest_version`.
///
/// # Errors
/// - `DbError::SchemaTooNew` when the file was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = schema_version(conn)?;
    let target = latest_version();

    if found > target {
        return Err(DbError::SchemaTooNew {
            found,
            supported: target,
        });
    }
    if found == target {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in MIGRATIONS.iter().filter(|step| step.version > found) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;

    info!("event=calendar_schema_upgrade module=db status=ok from={found} to={target}");
    Ok(())
}

fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
