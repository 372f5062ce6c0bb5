use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Per-lobby broadcast hub feeding the SSE and WebSocket subscribers.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_broadcasts() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        hub.broadcast(ServerEvent::json(Some("ping".to_owned()), &1).unwrap());
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("ping"));
        assert_eq!(event.data, "1");
    }
}
