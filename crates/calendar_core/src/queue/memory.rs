//! In-process queue broker.
//!
//! Named queues are declared on first use and buffer messages until a
//! subscriber takes them, so publishing ahead of the consumer loses nothing.

use super::{Inbox, QueueError, QueuePort, QueueResult, Subscription};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct NamedQueue {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    inbox: Inbox,
}

impl NamedQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            inbox: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct BrokerState {
    connected: bool,
    queues: HashMap<String, NamedQueue>,
}

impl BrokerState {
    fn declare(&mut self, queue_name: &str) -> QueueResult<&NamedQueue> {
        if !self.connected {
            return Err(QueueError::NotConnected);
        }
        Ok(self
            .queues
            .entry(queue_name.to_string())
            .or_insert_with(NamedQueue::new))
    }
}

/// Queue transport living entirely in process memory.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<BrokerState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl QueuePort for MemoryQueue {
    async fn connect(&self) -> QueueResult<()> {
        self.lock().connected = true;
        info!("event=queue_connect module=queue status=ok transport=memory");
        Ok(())
    }

    async fn publish(&self, body: Vec<u8>, queue_name: &str) -> QueueResult<()> {
        let bytes = body.len();
        let mut state = self.lock();
        let queue = state.declare(queue_name)?;
        queue
            .sender
            .send(body)
            .map_err(|_| QueueError::Closed(queue_name.to_string()))?;
        debug!(
            "event=queue_publish module=queue status=ok queue={queue_name} content_type=application/json bytes={bytes}"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        queue_name: &str,
        cancel: CancellationToken,
    ) -> QueueResult<Subscription> {
        let inbox = {
            let mut state = self.lock();
            Arc::clone(&state.declare(queue_name)?.inbox)
        };
        info!("event=queue_subscribe module=queue status=ok queue={queue_name}");
        Ok(Subscription::new(queue_name, inbox, cancel))
    }

    async fn close(&self) -> QueueResult<()> {
        let mut state = self.lock();
        state.connected = false;
        // Dropping the senders ends every subscription once it is drained.
        state.queues.clear();
        info!("event=queue_close module=queue status=ok transport=memory");
        Ok(())
    }
}
