//! Conversation event fan-out.
//!
//! Publishing never blocks and never fails the caller: events go to whoever
//! is subscribed at that instant and are not replayed to later subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wagewiz_core::config::EventsConfig;
use wagewiz_core::domain::conversation::ConversationId;

pub const RESPONSE_READY: &str = "response_ready";
pub const RESPONSE_FAILED: &str = "response_failed";

/// Wire envelope: `{"eventType": ..., "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn response_ready(conversation_id: &ConversationId, response: &str) -> Self {
        Self {
            event_type: RESPONSE_READY.to_string(),
            data: json!({ "conversationId": conversation_id, "response": response }),
        }
    }

    pub fn response_failed(conversation_id: &ConversationId, error: &str) -> Self {
        Self {
            event_type: RESPONSE_FAILED.to_string(),
            data: json!({ "conversationId": conversation_id, "error": error }),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.data.get("conversationId").and_then(Value::as_str)
    }
}

pub type EventCallback = Box<dyn Fn(&EventEnvelope) + Send + Sync>;

pub trait EventPublisher: Send + Sync {
    /// Returns the number of subscribers the event reached.
    fn publish(&self, event: EventEnvelope) -> usize;

    /// Invokes `callback` for every later event of one conversation until
    /// the returned handle is unsubscribed or dropped. Requires a Tokio runtime.
    fn subscribe(&self, conversation_id: &ConversationId, callback: EventCallback) -> Subscription;
}

/// Handle of one subscription; dropping it also unsubscribes.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// In-process bus on a Tokio broadcast channel. Slow subscribers lag and
/// lose events rather than back-pressuring the publisher.
pub struct BroadcastEventBus {
    channel_name: String,
    tx: broadcast::Sender<Arc<EventEnvelope>>,
    publish_count: AtomicU64,
}

impl BroadcastEventBus {
    pub fn new(channel_name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { channel_name: channel_name.into(), tx, publish_count: AtomicU64::new(0) }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.channel_name.clone(), config.capacity)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }
}

impl EventPublisher for BroadcastEventBus {
    fn publish(&self, event: EventEnvelope) -> usize {
        let _ = self.publish_count.fetch_add(1, Ordering::Relaxed);
        let event_type = event.event_type.clone();
        let conversation_id = event.conversation_id().unwrap_or_default().to_string();
        let delivered = self.tx.send(Arc::new(event)).unwrap_or(0);

        debug!(
            event_name = "events.publish",
            channel = %self.channel_name,
            event_type = %event_type,
            conversation_id = %conversation_id,
            delivered,
            "event published"
        );
        delivered
    }

    fn subscribe(&self, conversation_id: &ConversationId, callback: EventCallback) -> Subscription {
        let mut rx = self.tx.subscribe();
        let channel = self.channel_name.clone();
        let conversation_id = conversation_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.conversation_id() == Some(conversation_id.as_str()) => {
                        callback(&event);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            event_name = "events.subscriber_lagged",
                            channel = %channel,
                            conversation_id = %conversation_id,
                            skipped,
                            "subscriber fell behind; events dropped"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use wagewiz_core::domain::conversation::ConversationId;

    use super::{BroadcastEventBus, EventEnvelope, EventPublisher, Subscription};

    fn forward(
        bus: &BroadcastEventBus,
        conversation: &str,
    ) -> (Subscription, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(
            &ConversationId::new(conversation),
            Box::new(move |event| {
                let _ = tx.send(event.clone());
            }),
        );
        (subscription, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<EventEnvelope>) -> Option<EventEnvelope> {
        timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten()
    }

    #[test]
    fn envelope_serializes_with_camel_case_keys() {
        let event = EventEnvelope::response_ready(&ConversationId::new("conv-1"), "Done.");
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            serde_json::json!({
                "eventType": "response_ready",
                "data": { "conversationId": "conv-1", "response": "Done." }
            })
        );
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = BroadcastEventBus::new("ww_events", 8);
        let delivered =
            bus.publish(EventEnvelope::response_ready(&ConversationId::new("conv-1"), "hi"));
        assert_eq!(delivered, 0);
        assert_eq!(bus.publish_count(), 1);
    }

    #[tokio::test]
    async fn every_subscriber_of_a_conversation_is_called() {
        let bus = BroadcastEventBus::new("ww_events", 8);
        let (_first, mut first_rx) = forward(&bus, "conv-1");
        let (_second, mut second_rx) = forward(&bus, "conv-1");
        let (_other, mut other_rx) = forward(&bus, "conv-2");
        assert_eq!(bus.subscriber_count(), 3);

        let delivered =
            bus.publish(EventEnvelope::response_ready(&ConversationId::new("conv-1"), "Done."));
        assert_eq!(delivered, 3);

        assert_eq!(next(&mut first_rx).await.map(|event| event.event_type), Some("response_ready".to_string()));
        assert_eq!(next(&mut second_rx).await.map(|event| event.data["response"].clone()), Some("Done.".into()));
        assert_eq!(next(&mut other_rx).await, None);
    }

    #[tokio::test]
    async fn unsubscribe_stops_callbacks() {
        let bus = BroadcastEventBus::new("ww_events", 8);
        let (subscription, mut rx) = forward(&bus, "conv-1");

        bus.publish(EventEnvelope::response_failed(&ConversationId::new("conv-1"), "oops"));
        assert!(next(&mut rx).await.is_some());

        subscription.unsubscribe();
        tokio::task::yield_now().await;
        bus.publish(EventEnvelope::response_ready(&ConversationId::new("conv-1"), "late"));
        assert_eq!(next(&mut rx).await, None);
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving_newer_events() {
        let bus = BroadcastEventBus::new("ww_events", 1);
        let (_subscription, mut rx) = forward(&bus, "conv-1");
        let conversation = ConversationId::new("conv-1");

        for index in 0..4 {
            bus.publish(EventEnvelope::response_ready(&conversation, &format!("reply {index}")));
        }

        let mut last = None;
        while let Some(event) = next(&mut rx).await {
            last = Some(event);
        }
        assert_eq!(last.map(|event| event.data["response"].clone()), Some("reply 3".into()));
    }
}
