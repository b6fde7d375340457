//! Calendar event store and asynchronous notification pipeline.
//!
//! Events are kept in an `EventStore` (in-memory or SQLite). A `Scheduler`
//! polls the store for due notifications and stale events and publishes
//! payloads through a `QueuePort`, where a `NotificationConsumer` renders
//! and dispatches them. `EventService` is the entry point for transport
//! layers.

pub mod config;
pub mod consumer;
pub mod db;
pub mod logging;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod store;

pub use config::{
    CalendarConfig, ConfigError, LoggerConfig, QueueConfig, SchedulerConfig, StorageConfig,
    StorageKind,
};
pub use consumer::{
    render_notice, ConsumerError, LogSink, Notice, NotificationConsumer, NotificationSink,
};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::event::{DateRange, Event, EventId, OwnerId};
pub use queue::{MemoryQueue, QueueError, QueuePort, QueueResult, Subscription};
pub use scheduler::{NotifyReport, Scheduler, SchedulerError, SchedulerResult, SchedulerState};
pub use service::event_service::{
    build_event, EventInput, EventService, ParseFailure, ServiceError, ServiceResult,
};
pub use store::{
    open_event_store, EventMap, EventStore, MemoryEventStore, SqliteEventStore, SqliteLocation,
    StoreError, StoreResult,
};
