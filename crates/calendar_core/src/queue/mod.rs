//! Publish/subscribe boundary between the scheduler and the notification
//! consumer.
//!
//! # Responsibility
//! - Define the transport-agnostic queue contract.
//! - Expose subscriptions as cancellable message streams.
//!
//! # Invariants
//! - A subscription ends when its cancellation token fires or when the
//!   queue it reads from is closed.
//! - Payloads are opaque bytes; JSON encoding is the caller's concern.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

mod memory;

pub use memory::MemoryQueue;

pub type QueueResult<T> = Result<T, QueueError>;

/// Shared receiving end of one named queue. Subscribers of the same queue
/// compete for messages.
pub type Inbox = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

/// Transport failure at the queue boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    NotConnected,
    Closed(String),
    Transport(String),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => f.write_str("queue is not connected"),
            Self::Closed(queue_name) => write!(f, "queue `{queue_name}` is closed"),
            Self::Transport(message) => write!(f, "queue transport error: {message}"),
        }
    }
}

impl Error for QueueError {}

/// Queue transport contract.
#[async_trait]
pub trait QueuePort: Send + Sync {
    async fn connect(&self) -> QueueResult<()>;

    /// Publishes one message to `queue_name`. Fire-and-forget.
    async fn publish(&self, body: Vec<u8>, queue_name: &str) -> QueueResult<()>;

    /// Subscribes to `queue_name` until `cancel` fires or the queue closes.
    async fn subscribe(
        &self,
        queue_name: &str,
        cancel: CancellationToken,
    ) -> QueueResult<Subscription>;

    async fn close(&self) -> QueueResult<()>;

    /// Invokes `callback` once per received message until the subscription ends.
    async fn receive(
        &self,
        queue_name: &str,
        cancel: CancellationToken,
        callback: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> QueueResult<()> {
        let mut subscription = self.subscribe(queue_name, cancel).await?;
        while let Some(body) = subscription.next().await {
            callback(body);
        }
        Ok(())
    }
}

/// Cancellable stream of payloads from one named queue.
pub struct Subscription {
    queue_name: String,
    inbox: Inbox,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(queue_name: impl Into<String>, inbox: Inbox, cancel: CancellationToken) -> Self {
        Self {
            queue_name: queue_name.into(),
            inbox,
            cancel,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Waits for the next payload.
    ///
    /// Returns `None` once cancelled or once the queue is closed and drained.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        let mut inbox = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            guard = self.inbox.lock() => guard,
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            body = inbox.recv() => body,
        }
    }
}
