//! Shared types used across all prosa crates.

pub mod types;

pub use types::{DeliveryStatus, InboundEvent, SendAck, SenderType, now_millis};
