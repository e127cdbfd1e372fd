use {
    anyhow::Result,
    async_trait::async_trait,
    std::sync::Arc,
    tokio::sync::mpsc,
};

use prosa_common::types::{InboundEvent, SendAck};

/// Events the transport pushes to the session manager.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An out-of-band pairing payload (e.g. a QR code) must be shown to the
    /// operator to authenticate the session.
    PairingReady { payload: String },
    /// Credentials were accepted; the session is about to come online.
    Authenticated,
    /// The session is fully connected as `address`.
    Ready {
        address: String,
        display_name: Option<String>,
    },
    /// An inbound message arrived.
    Message(InboundEvent),
    /// The connection dropped. The manager decides whether to reconnect.
    Disconnected { reason: String },
    /// Authentication failed terminally; stored credentials are stale.
    AuthFailure { reason: String },
}

/// Handle to one live transport connection.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Send a text message. Blocks the calling flow until the transport
    /// acknowledges or times out; timeouts surface as errors, not hangs.
    async fn send_text(&self, to: &str, text: &str) -> Result<SendAck>;

    /// Log the messaging identity out of the network.
    async fn logout(&self) -> Result<()>;

    /// Release all connection resources.
    async fn destroy(&self) -> Result<()>;
}

/// The opaque messaging client. One connection per tenant; events flow back
/// through the channel handed to [`Transport::connect`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start (or resume) a connection for a tenant. Events for the life of
    /// the connection are delivered on `events`.
    async fn connect(
        &self,
        tenant_id: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>>;

    /// Drop any persisted credential material for a tenant, forcing a fresh
    /// pairing on the next connect.
    async fn clear_credentials(&self, tenant_id: &str) -> Result<()>;
}
