use std::sync::Arc;

use {async_trait::async_trait, tracing::warn};

use {
    prosa_common::types::{DeliveryStatus, SendAck, SenderType},
    prosa_events::{Event, EventSink},
    prosa_sessions::SessionManager,
    prosa_store::{ContactStore, ConversationStore, MessageStore, NewMessage, StoredMessage},
};

use crate::error::{Error, Result};

/// The raw-send seam towards the session layer. [`SessionManager`] is the
/// production implementation; tests substitute fakes.
#[async_trait]
pub trait RawSender: Send + Sync {
    async fn send_raw(
        &self,
        tenant_id: &str,
        to: &str,
        text: &str,
    ) -> prosa_sessions::Result<SendAck>;
}

#[async_trait]
impl RawSender for SessionManager {
    async fn send_raw(
        &self,
        tenant_id: &str,
        to: &str,
        text: &str,
    ) -> prosa_sessions::Result<SendAck> {
        SessionManager::send_raw(self, tenant_id, to, text).await
    }
}

/// Sends bot- and agent-originated messages, persisting before sending so
/// history survives a failed or interrupted send.
pub struct Dispatcher {
    sender: Arc<dyn RawSender>,
    contacts: Arc<dyn ContactStore>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sender: Arc<dyn RawSender>,
        contacts: Arc<dyn ContactStore>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sender,
            contacts,
            conversations,
            messages,
            events,
        }
    }

    /// Persist an outbound message, send it, and record the outcome.
    ///
    /// The pending record is written before the send so the message is never
    /// lost; on transport failure it is marked failed and the error is
    /// propagated. No automatic retry — a retry is a new explicit call.
    pub async fn dispatch(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        text: &str,
        sender_type: SenderType,
    ) -> Result<StoredMessage> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| Error::UnknownConversation {
                conversation_id: conversation_id.to_string(),
            })?;
        let contact = self
            .contacts
            .get(&conversation.contact_id)
            .await?
            .ok_or_else(|| Error::UnknownContact {
                contact_id: conversation.contact_id.clone(),
            })?;

        let mut message = self
            .messages
            .append(NewMessage::outbound(conversation_id, sender_type, text))
            .await?;
        self.conversations
            .touch_last_message(conversation_id, message.created_at)
            .await?;

        match self
            .sender
            .send_raw(tenant_id, &contact.external_address, text)
            .await
        {
            Ok(ack) => {
                self.messages
                    .update_delivery(
                        &message.id,
                        DeliveryStatus::Sent,
                        ack.transport_message_id.as_deref(),
                    )
                    .await?;
                message.delivery_status = DeliveryStatus::Sent;
                if let Some(transport_id) = &ack.transport_message_id {
                    message.metadata =
                        serde_json::json!({ "transport_message_id": transport_id });
                }
                self.events
                    .emit(Event::MessageSent {
                        tenant_id: tenant_id.to_string(),
                        conversation_id: conversation_id.to_string(),
                        message: message.clone(),
                    })
                    .await;
                Ok(message)
            },
            Err(e) => {
                warn!(
                    tenant_id,
                    conversation_id,
                    error = %e,
                    "outbound send failed; message recorded as failed"
                );
                self.messages
                    .update_delivery(&message.id, DeliveryStatus::Failed, None)
                    .await?;
                Err(Error::Session(e))
            },
        }
    }
}
