//! Calendar domain model.
//!
//! # Responsibility
//! - Define the canonical event record shared by storage, scheduling and
//!   notification delivery.
//!
//! # Invariants
//! - Every event is identified by a stable `EventId`.
//! - Components outside the store only ever hold copies of an event.

pub mod event;
