// Fire-and-forget publish/subscribe event bus, consumed by the identity
// engine and orchestrator to announce lifecycle events. The core never
// blocks on publish and never treats a delivery failure as an error.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

pub const TOPIC_DEVICE_CREATED: &str = "device.created";
pub const TOPIC_DEVICE_STATUS_CHANGED: &str = "device.status_changed";
pub const TOPIC_DEVICE_LOST: &str = "device.lost";
pub const TOPIC_SCAN_STARTED: &str = "scan.started";
pub const TOPIC_SCAN_COMPLETED: &str = "scan.completed";
pub const TOPIC_SCAN_FAILED: &str = "scan.failed";
pub const TOPIC_SERVICE_MOVEMENT_DETECTED: &str = "service.movement_detected";

#[derive(Debug, Clone)]
pub struct Event {
    pub topic: &'static str,
    pub payload: Value,
}

/// An in-memory bus good enough to exercise the core end to end. A real
/// deployment swaps this for whatever transport the surrounding system uses;
/// callers only depend on `publish`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes `payload` under `topic`. Never fails: a topic with no
    /// subscribers just drops the send, matching the fire-and-forget
    /// contract.
    pub fn publish(&self, topic: &'static str, payload: impl Serialize) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                trace!(topic, error = %e, "event payload did not serialize, dropping");
                return;
            }
        };
        let _ = self.sender.send(Event { topic, payload });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(TOPIC_DEVICE_CREATED, json!({"id": "abc"}));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(TOPIC_DEVICE_LOST, json!({"id": "xyz"}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_DEVICE_LOST);
    }
}
