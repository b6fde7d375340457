//! Notification consumer.
//!
//! # Responsibility
//! - Subscribe to the notification queue and decode event payloads.
//! - Render a human-readable notice and hand it to a sink.
//!
//! # Invariants
//! - A malformed payload is logged and skipped; the receive loop keeps going.
//! - No retries and no persisted state; every message is independent.

use crate::model::event::Event;
use crate::queue::{QueueError, QueuePort};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum ConsumerError {
    /// Payload is not a valid JSON event.
    Serialization(serde_json::Error),
}

impl Display for ConsumerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(err) => write!(f, "failed to decode event payload: {err}"),
        }
    }
}

impl Error for ConsumerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConsumerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Rendered notification for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub event: Event,
    pub message: String,
}

impl Notice {
    pub fn for_event(event: Event) -> Self {
        let message = render_notice(&event);
        Self { event, message }
    }
}

/// Renders the human-readable text of a notification.
pub fn render_notice(event: &Event) -> String {
    let at = format_timestamp(event.start);
    match event.description.as_deref().filter(|text| !text.is_empty()) {
        None => format!("notice for `{}` at {at}", event.title),
        Some(description) => format!("notice for `{}`: {description} at {at}", event.title),
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Final delivery step for rendered notices.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, notice: &Notice);
}

/// Sink that writes notices to the process log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn dispatch(&self, notice: &Notice) {
        info!(
            "event=notice_dispatch module=consumer status=ok id={} owner={} message={}",
            notice.event.id, notice.event.owner_id, notice.message
        );
    }
}

/// Reads notification payloads from the queue and dispatches notices.
pub struct NotificationConsumer {
    queue: Arc<dyn QueuePort>,
    queue_name: String,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationConsumer {
    /// Creates a consumer dispatching to the log.
    pub fn new(queue: Arc<dyn QueuePort>, queue_name: impl Into<String>) -> Self {
        Self::with_sink(queue, queue_name, Arc::new(LogSink))
    }

    pub fn with_sink(
        queue: Arc<dyn QueuePort>,
        queue_name: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            sink,
        }
    }

    /// Decodes one payload, renders it and dispatches the notice.
    pub fn handle_message(&self, body: &[u8]) -> Result<Notice, ConsumerError> {
        let event: Event = serde_json::from_slice(body)?;
        let notice = Notice::for_event(event);
        self.sink.dispatch(&notice);
        Ok(notice)
    }

    /// Connects, subscribes and processes messages until `cancel` fires or the
    /// queue closes. Returns the number of dispatched notices.
    ///
    /// # Errors
    /// - Returns `QueueError` when connecting or subscribing fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<usize, QueueError> {
        self.queue.connect().await?;
        let mut subscription = self.queue.subscribe(&self.queue_name, cancel).await?;
        info!(
            "event=consumer_start module=consumer status=ok queue={}",
            self.queue_name
        );

        let mut dispatched = 0;
        while let Some(body) = subscription.next().await {
            match self.handle_message(&body) {
                Ok(_) => dispatched += 1,
                Err(err) => error!(
                    "event=consumer_decode module=consumer status=error bytes={} error={err}",
                    body.len()
                ),
            }
        }

        info!("event=consumer_stop module=consumer status=ok dispatched={dispatched}");
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::render_notice;
    use crate::model::event::Event;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample() -> Event {
        let start = Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap();
        Event::new("Retro", start, start, Uuid::new_v4())
    }

    #[test]
    fn notice_without_description() {
        assert_eq!(
            render_notice(&sample()),
            "notice for `Retro` at 2009-11-10T23:00:00Z"
        );
    }

    #[test]
    fn empty_description_renders_like_missing() {
        let mut event = sample();
        event.description = Some(String::new());
        assert_eq!(
            render_notice(&event),
            "notice for `Retro` at 2009-11-10T23:00:00Z"
        );
    }

    #[test]
    fn notice_with_description() {
        let mut event = sample();
        event.description = Some("bring notes".to_string());
        assert_eq!(
            render_notice(&event),
            "notice for `Retro`: bring notes at 2009-11-10T23:00:00Z"
        );
    }
}
