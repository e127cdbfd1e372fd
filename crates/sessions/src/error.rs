use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The session failed to start; the session object was discarded and the
    /// caller may retry.
    #[error("session initialization failed for tenant {tenant_id}: {source}")]
    Init {
        tenant_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A send was attempted while the tenant's channel is not connected.
    #[error("tenant {tenant_id} is not connected")]
    NotConnected { tenant_id: String },

    /// Per-message send failure. Isolated to the message, never fatal to the
    /// session.
    #[error("send failed for tenant {tenant_id}: {source}")]
    Send {
        tenant_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
