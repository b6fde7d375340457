use calendar_core::{
    Event, MemoryQueue, Notice, NotificationConsumer, NotificationSink, QueuePort,
};
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const QUEUE_NAME: &str = "notifications";

#[derive(Default)]
struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|notice| notice.message.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn dispatch(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

fn event(title: &str, description: Option<&str>) -> Event {
    let start = Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap();
    let mut event = Event::new(title, start, start, Uuid::new_v4());
    event.description = description.map(str::to_string);
    event
}

#[test]
fn handle_message_decodes_and_dispatches() {
    let sink = Arc::new(RecordingSink::default());
    let consumer =
        NotificationConsumer::with_sink(Arc::new(MemoryQueue::new()), QUEUE_NAME, sink.clone());

    let body = serde_json::to_vec(&event("Demo", Some("room 4"))).unwrap();
    let notice = consumer.handle_message(&body).unwrap();

    assert_eq!(notice.event.title, "Demo");
    assert_eq!(
        sink.messages(),
        vec!["notice for `Demo`: room 4 at 2009-11-10T23:00:00Z".to_string()]
    );
}

#[test]
fn handle_message_rejects_malformed_payload() {
    let sink = Arc::new(RecordingSink::default());
    let consumer =
        NotificationConsumer::with_sink(Arc::new(MemoryQueue::new()), QUEUE_NAME, sink.clone());

    let err = consumer.handle_message(b"{not json").unwrap_err();
    assert!(err.to_string().contains("failed to decode event payload"));
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn malformed_message_does_not_stop_the_receive_loop() {
    let queue = Arc::new(MemoryQueue::new());
    let sink = Arc::new(RecordingSink::default());
    let consumer = NotificationConsumer::with_sink(queue.clone(), QUEUE_NAME, sink.clone());

    queue.connect().await.unwrap();
    queue
        .publish(b"garbage".to_vec(), QUEUE_NAME)
        .await
        .unwrap();
    queue
        .publish(br#"{"id":"not-a-uuid"}"#.to_vec(), QUEUE_NAME)
        .await
        .unwrap();
    queue
        .publish(
            serde_json::to_vec(&event("Standup", None)).unwrap(),
            QUEUE_NAME,
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let runner = {
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while sink.messages().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    let dispatched = runner.await.unwrap().unwrap();

    assert_eq!(dispatched, 1);
    assert_eq!(
        sink.messages(),
        vec!["notice for `Standup` at 2009-11-10T23:00:00Z".to_string()]
    );
}

#[tokio::test]
async fn run_ends_when_queue_closes() {
    let queue = Arc::new(MemoryQueue::new());
    let consumer = NotificationConsumer::new(queue.clone(), QUEUE_NAME);

    let runner = tokio::spawn(async move { consumer.run(CancellationToken::new()).await });
    while !queue.is_connected() {
        tokio::task::yield_now().await;
    }
    queue
        .publish(serde_json::to_vec(&event("Wrap-up", None)).unwrap(), QUEUE_NAME)
        .await
        .unwrap();
    queue.close().await.unwrap();

    let dispatched = tokio::time::timeout(std::time::Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(dispatched, 1);
}
