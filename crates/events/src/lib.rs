//! Typed events the messaging core emits for real-time observers.
//!
//! The core only requires a fire-and-forget publish primitive; how events
//! reach browsers (WebSocket, SSE, ...) is the embedding application's
//! concern. [`BroadcastEventSink`] is the stock fan-out implementation.

use {async_trait::async_trait, serde::Serialize, tokio::sync::broadcast};

use prosa_store::StoredMessage;

/// Events emitted by the session manager and the message pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SessionStateChanged {
        tenant_id: String,
        state: String,
    },
    /// A pairing payload is ready to be shown to the operator.
    PairingReady {
        tenant_id: String,
        payload: String,
    },
    MessageIngested {
        tenant_id: String,
        conversation_id: String,
        message: StoredMessage,
    },
    MessageSent {
        tenant_id: String,
        conversation_id: String,
        message: StoredMessage,
    },
}

/// Fire-and-forget event publisher. Implementations must never block core
/// processing.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Sink that drops every event. Useful in tests and headless deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: Event) {}
}

/// Sink backed by a tokio broadcast channel. Sending never blocks; when no
/// observer is subscribed the event is dropped.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: Event) {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}
