//! In-memory event store.
//!
//! # Invariants
//! - All events live in one map behind one `RwLock`.
//! - Writes hold the exclusive lock across check-then-mutate.
//! - Reads hold the shared lock and return copies.
//! - A closed store rejects every operation with `NotConnected` until
//!   `connect` opens a fresh, empty map.

use super::{check_storable, EventMap, EventStore, StoreError, StoreResult};
use crate::model::event::{DateRange, Event, EventId, OwnerId};
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Event store holding every event in process memory.
///
/// `None` in the lock marks the store as closed.
#[derive(Debug)]
pub struct MemoryEventStore {
    items: RwLock<Option<EventMap>>,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self {
            items: RwLock::new(Some(EventMap::new())),
        }
    }
}

impl MemoryEventStore {
    /// Creates an open, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events. A closed store holds none.
    pub fn len(&self) -> usize {
        self.read().as_ref().map_or(0, EventMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<EventMap>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<EventMap>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_items<T>(&self, op: impl FnOnce(&EventMap) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.read();
        let items = guard.as_ref().ok_or(StoreError::NotConnected)?;
        op(items)
    }

    fn with_items_mut<T>(
        &self,
        op: impl FnOnce(&mut EventMap) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.write();
        let items = guard.as_mut().ok_or(StoreError::NotConnected)?;
        op(items)
    }

    fn collect_where(&self, predicate: impl Fn(&Event) -> bool) -> StoreResult<EventMap> {
        self.with_items(|items| {
            Ok(items
                .iter()
                .filter(|(_, event)| predicate(event))
                .map(|(id, event)| (*id, event.clone()))
                .collect())
        })
    }
}

impl EventStore for MemoryEventStore {
    fn connect(&self) -> StoreResult<()> {
        *self.write() = Some(EventMap::new());
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        *self.write() = None;
        Ok(())
    }

    fn add_event(&self, event: &Event) -> StoreResult<()> {
        self.with_items_mut(|items| {
            check_storable(event)?;
            match items.entry(event.id) {
                Entry::Occupied(_) => Err(StoreError::AlreadyExists(event.id)),
                Entry::Vacant(slot) => {
                    slot.insert(event.clone());
                    Ok(())
                }
            }
        })
    }

    fn change_event(&self, id: EventId, event: &Event) -> StoreResult<()> {
        self.with_items_mut(|items| {
            check_storable(event)?;
            let stored = items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            *stored = Event {
                id,
                ..event.clone()
            };
            Ok(())
        })
    }

    fn remove_event(&self, id: EventId) -> StoreResult<()> {
        self.with_items_mut(|items| {
            items
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound(id))
        })
    }

    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        self.with_items(|items| Ok(items.get(&id).cloned()))
    }

    fn list_events_by_range(&self, range: &DateRange) -> StoreResult<EventMap> {
        self.collect_where(|event| event.matches_range(range))
    }

    fn list_events_by_owner(&self, owner_id: OwnerId) -> StoreResult<EventMap> {
        self.collect_where(|event| event.owner_id == owner_id)
    }

    fn list_events_for_notification(&self, now: DateTime<Utc>) -> StoreResult<EventMap> {
        self.collect_where(|event| event.is_due(now))
    }

    fn set_is_notified(&self, id: EventId) -> StoreResult<()> {
        self.with_items_mut(|items| {
            let stored = items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            stored.notified = true;
            Ok(())
        })
    }

    fn remove_old_events(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.with_items_mut(|items| {
            let before = items.len();
            items.retain(|_, event| event.end >= cutoff);
            Ok(before - items.len())
        })
    }
}
