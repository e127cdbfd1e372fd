//! Persistence records and store traits for contacts, conversations,
//! messages, bot configuration, and channel descriptors.
//!
//! The traits are the seam between the messaging core and whatever database
//! backs a deployment. [`memory::MemoryStore`] implements all of them
//! in-process and is what the tests (and database-less deployments) use.

pub mod bot_config;
pub mod channel;
pub mod contact;
pub mod conversation;
pub mod memory;
pub mod message;

pub use {
    bot_config::{BotConfig, BotConfigStore, FallbackReply, KeywordRule, MenuAction, MenuOption},
    channel::{ChannelDescriptor, ChannelStore},
    contact::{Contact, ContactStore},
    conversation::{Conversation, ConversationStatus, ConversationStore, DialogState},
    memory::MemoryStore,
    message::{MessageStore, NewMessage, StoredMessage},
};
