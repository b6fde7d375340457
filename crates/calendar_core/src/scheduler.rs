//! Periodic notification and retention scheduler.
//!
//! # Responsibility
//! - Publish due notifications to the queue and mark them notified.
//! - Purge events that ended before the retention cutoff.
//!
//! # Invariants
//! - One control loop; ticks never overlap.
//! - `Notifying` and `Purging` last exactly as long as their tick; every tick
//!   returns the state to `Idle`.
//! - An event is marked notified whether or not its publish succeeded
//!   (at-most-once marking). Publish failures are logged, never retried.
//! - Storage and queue errors inside a tick are logged and never end the loop;
//!   only cancellation does.

use crate::config::{QueueConfig, SchedulerConfig, DEFAULT_QUEUE_NAME};
use crate::model::event::Event;
use crate::queue::{QueueError, QueuePort};
use crate::store::{EventStore, StoreError, StoreResult};
use chrono::{DateTime, Months, Utc};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug)]
pub enum SchedulerError {
    Queue(QueueError),
    Store(StoreError),
    Serialization(serde_json::Error),
    /// A blocking storage task panicked or was cancelled.
    Join(String),
}

impl Display for SchedulerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "failed to encode event: {err}"),
            Self::Join(message) => write!(f, "storage task failed: {message}"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Queue(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Join(_) => None,
        }
    }
}

impl From<QueueError> for SchedulerError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

impl From<StoreError> for SchedulerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Observable phase of the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Notifying,
    Purging,
    Stopped,
}

/// Outcome of one notification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Events returned as due by the store.
    pub due: usize,
    /// Events successfully handed to the queue.
    pub published: usize,
    /// Events marked notified.
    pub marked: usize,
}

/// Scans the event store on two timers and feeds the notification queue.
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn QueuePort>,
    queue_name: String,
    notify_interval: Duration,
    retention_interval: Duration,
    retention_months: u32,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    /// Creates a scheduler with default intervals and retention.
    pub fn new(
        store: Arc<dyn EventStore>,
        queue: Arc<dyn QueuePort>,
        queue_name: impl Into<String>,
    ) -> Self {
        let defaults = SchedulerConfig::default();
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
            notify_interval: defaults.notify_interval(),
            retention_interval: defaults.retention_interval(),
            retention_months: defaults.retention_months,
            state,
        }
    }

    pub fn from_config(
        store: Arc<dyn EventStore>,
        queue: Arc<dyn QueuePort>,
        scheduler: &SchedulerConfig,
        queue_config: &QueueConfig,
    ) -> Self {
        let queue_name = if queue_config.name.trim().is_empty() {
            DEFAULT_QUEUE_NAME.to_string()
        } else {
            queue_config.name.clone()
        };
        Self::new(store, queue, queue_name)
            .with_intervals(scheduler.notify_interval(), scheduler.retention_interval())
            .with_retention_months(scheduler.retention_months)
    }

    /// Overrides both timer periods. Zero periods are raised to one millisecond.
    pub fn with_intervals(mut self, notify: Duration, retention: Duration) -> Self {
        self.notify_interval = notify.max(Duration::from_millis(1));
        self.retention_interval = retention.max(Duration::from_millis(1));
        self
    }

    pub fn with_retention_months(mut self, months: u32) -> Self {
        self.retention_months = months;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Runs the scheduler loop until `cancel` fires.
    ///
    /// # Errors
    /// - Returns `SchedulerError::Queue` when the queue cannot be connected.
    ///   Nothing after startup ends the loop with an error.
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerResult<()> {
        if let Err(err) = self.queue.connect().await {
            error!("event=scheduler_start module=scheduler status=error error={err}");
            return Err(err.into());
        }

        let started = Instant::now();
        let mut notify_timer = interval_at(started + self.notify_interval, self.notify_interval);
        notify_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retention_timer =
            interval_at(started + self.retention_interval, self.retention_interval);
        retention_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "event=scheduler_start module=scheduler status=ok queue={} notify_interval_ms={} retention_interval_ms={}",
            self.queue_name,
            self.notify_interval.as_millis(),
            self.retention_interval.as_millis()
        );

        self.state.send_replace(SchedulerState::Idle);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = notify_timer.tick() => {
                    self.notification_tick().await;
                }
                _ = retention_timer.tick() => {
                    self.retention_tick().await;
                }
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("event=scheduler_stop module=scheduler status=ok");
        Ok(())
    }

    /// Runs one notification pass at the current time, logging any failure.
    pub async fn notification_tick(&self) -> NotifyReport {
        self.state.send_replace(SchedulerState::Notifying);
        let report = match self.notify_due(Utc::now()).await {
            Ok(report) => {
                if report.due > 0 {
                    info!(
                        "event=notify_tick module=scheduler status=ok due={} published={} marked={}",
                        report.due, report.published, report.marked
                    );
                }
                report
            }
            Err(err) => {
                error!("event=notify_tick module=scheduler status=error error={err}");
                NotifyReport::default()
            }
        };
        self.state.send_replace(SchedulerState::Idle);
        report
    }

    /// Publishes every event due at `now` and marks each one notified.
    ///
    /// Only the initial store query can fail the whole pass; per-event publish
    /// and marking failures are logged and counted in the report.
    pub async fn notify_due(&self, now: DateTime<Utc>) -> SchedulerResult<NotifyReport> {
        let events = self
            .with_store(move |store| store.list_events_for_notification(now))
            .await?;

        let mut report = NotifyReport {
            due: events.len(),
            ..NotifyReport::default()
        };

        for event in events.into_values() {
            match self.publish_event(&event).await {
                Ok(()) => report.published += 1,
                Err(err) => warn!(
                    "event=notify_publish module=scheduler status=error id={} error={err}",
                    event.id
                ),
            }

            let id = event.id;
            match self.with_store(move |store| store.set_is_notified(id)).await {
                Ok(()) => report.marked += 1,
                Err(err) => {
                    error!("event=notify_mark module=scheduler status=error id={id} error={err}")
                }
            }
        }

        Ok(report)
    }

    /// Runs one retention pass at the current time, logging any failure.
    pub async fn retention_tick(&self) -> usize {
        self.state.send_replace(SchedulerState::Purging);
        let removed = match self.purge_stale(Utc::now()).await {
            Ok(removed) => {
                info!("event=retention_tick module=scheduler status=ok removed={removed}");
                removed
            }
            Err(err) => {
                error!("event=retention_tick module=scheduler status=error error={err}");
                0
            }
        };
        self.state.send_replace(SchedulerState::Idle);
        removed
    }

    /// Deletes every event that ended before `now` minus the retention period.
    pub async fn purge_stale(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let cutoff = self.retention_cutoff(now);
        debug!("event=retention_tick module=scheduler status=start cutoff={cutoff}");
        self.with_store(move |store| store.remove_old_events(cutoff))
            .await
    }

    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.retention_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn publish_event(&self, event: &Event) -> SchedulerResult<()> {
        let body = serde_json::to_vec(event).map_err(SchedulerError::Serialization)?;
        self.queue.publish(body, &self.queue_name).await?;
        Ok(())
    }

    async fn with_store<T, F>(&self, op: F) -> SchedulerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EventStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|err| SchedulerError::Join(err.to_string()))?;
        Ok(result?)
    }
}
