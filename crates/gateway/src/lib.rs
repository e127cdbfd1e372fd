//! The composed messaging core and its control API.
//!
//! [`MessagingService`] is what the embedding application (the CRUD/HTTP
//! layer) holds: one instance per process, all tenants multiplexed through
//! it. Everything underneath — session manager, ingestion pipeline, dialog
//! engine, dispatcher — is wired at construction.

pub mod error;
pub mod service;

pub use {
    error::{Error, Result},
    service::{MessagingService, SendReceipt, Stores},
};
