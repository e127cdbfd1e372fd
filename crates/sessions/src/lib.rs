//! Per-tenant session lifecycle over an opaque messaging transport.
//!
//! One [`manager::SessionManager`] owns every tenant session in the process:
//! pairing, reconnection with capped backoff, teardown, and raw sends. The
//! transport itself (the actual messaging network client) is a collaborator
//! behind the [`transport::Transport`] trait.

pub mod error;
pub mod manager;
pub mod state;
pub mod transport;

pub use {
    error::{Error, Result},
    manager::{ConnectionInfo, InboundSink, SessionManager},
    state::{PAIRING_PAYLOAD_TTL, PairingPayload, ReconnectPolicy, SessionState, SessionStatus},
    transport::{Transport, TransportEvent, TransportHandle},
};
