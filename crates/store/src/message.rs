use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use prosa_common::types::{DeliveryStatus, SenderType};

/// A persisted message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub content_type: String,
    /// Opaque transport metadata (transport message id, media flags, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub delivery_status: DeliveryStatus,
    pub read: bool,
    /// Epoch millis. Strictly non-decreasing within a conversation; the
    /// store assigns it at append time.
    pub created_at: i64,
}

/// A message about to be appended. The store assigns id and `created_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub content_type: String,
    pub metadata: serde_json::Value,
    pub delivery_status: DeliveryStatus,
    pub read: bool,
}

impl NewMessage {
    /// An inbound contact message, recorded as already delivered.
    #[must_use]
    pub fn from_contact(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        content_type: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_type: SenderType::Contact,
            content: content.into(),
            content_type: content_type.into(),
            metadata,
            delivery_status: DeliveryStatus::Sent,
            read: false,
        }
    }

    /// An outbound message awaiting transport acknowledgement.
    #[must_use]
    pub fn outbound(
        conversation_id: impl Into<String>,
        sender_type: SenderType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_type,
            content: content.into(),
            content_type: "chat".to_string(),
            metadata: serde_json::Value::Null,
            delivery_status: DeliveryStatus::Pending,
            read: true,
        }
    }
}

/// Append-only persistent storage for messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message, assigning id and a `created_at` that is never below
    /// the previous message's `created_at` in the same conversation.
    async fn append(&self, message: NewMessage) -> Result<StoredMessage>;

    /// Update delivery status after a send attempt, optionally attaching the
    /// transport message id to the record metadata.
    async fn update_delivery(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        transport_message_id: Option<&str>,
    ) -> Result<()>;

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;

    /// Number of contact-originated messages in a conversation.
    async fn count_from_contact(&self, conversation_id: &str) -> Result<u64>;
}
