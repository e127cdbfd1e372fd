use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected at the boundary; the stored configuration is untouched.
    #[error("invalid bot configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Session(#[from] prosa_sessions::Error),

    #[error(transparent)]
    Pipeline(#[from] prosa_auto_reply::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
