//! Inbound message processing pipeline — the glue between sessions and
//! conversation history.
//!
//! Flow: transport inbound event → per-conversation queue → resolve contact →
//! resolve open conversation → persist message → dialog engine decision →
//! dispatch reply → emit events.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod queue;

pub use {
    dispatch::{Dispatcher, RawSender},
    engine::DialogEngine,
    error::{Error, Result},
    ingest::IngestionPipeline,
    queue::ConversationQueues,
};
