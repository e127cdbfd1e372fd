use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown conversation: {conversation_id}")]
    UnknownConversation { conversation_id: String },

    #[error("unknown contact: {contact_id}")]
    UnknownContact { contact_id: String },

    /// The transport send failed. The message record is already persisted
    /// with `delivery_status = failed`; no retry is attempted.
    #[error(transparent)]
    Session(#[from] prosa_sessions::Error),

    /// A persistence operation failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
