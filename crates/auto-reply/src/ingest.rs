//! Inbound message ingestion.
//!
//! Receives transport events from the session layer and turns each into a
//! contact, a conversation, a persisted message, and (maybe) a bot reply.
//! Work is serialized per conversation through [`ConversationQueues`]; the
//! sink itself never blocks the session event loop.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::json,
    tracing::{debug, warn},
};

use {
    prosa_common::types::InboundEvent,
    prosa_events::{Event, EventSink},
    prosa_sessions::InboundSink,
    prosa_store::{
        BotConfigStore, ContactStore, ConversationStatus, ConversationStore, MessageStore,
        NewMessage, contact::ENGAGEMENT_INCREMENT,
    },
};

use crate::{engine::DialogEngine, error::Result, queue::ConversationQueues};

struct Inner {
    contacts: Arc<dyn ContactStore>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    bot_configs: Arc<dyn BotConfigStore>,
    engine: DialogEngine,
    events: Arc<dyn EventSink>,
}

/// The session layer's inbound sink. Filters, queues, and processes contact
/// messages; group messages are dropped unrecorded.
pub struct IngestionPipeline {
    inner: Arc<Inner>,
    queues: ConversationQueues,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        bot_configs: Arc<dyn BotConfigStore>,
        engine: DialogEngine,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                contacts,
                conversations,
                messages,
                bot_configs,
                engine,
                events,
            }),
            queues: ConversationQueues::new(),
        }
    }
}

#[async_trait]
impl InboundSink for IngestionPipeline {
    async fn ingest(&self, tenant_id: &str, event: InboundEvent) {
        if event.is_group {
            debug!(tenant_id, "ignoring group message");
            return;
        }
        if event.sender_address.trim().is_empty() {
            warn!(tenant_id, "inbound event without sender address; dropped");
            return;
        }

        // Enqueue synchronously so per-conversation arrival order is the
        // transport delivery order. The sender address identifies the open
        // conversation before any store lookup.
        let key = format!("{tenant_id}:{}", event.sender_address);
        let inner = Arc::clone(&self.inner);
        let tenant = tenant_id.to_string();
        self.queues.enqueue(&key, async move {
            if let Err(e) = inner.process(&tenant, event).await {
                warn!(tenant_id = tenant, error = %e, "inbound message dropped");
            }
        });
    }
}

impl Inner {
    async fn process(&self, tenant_id: &str, event: InboundEvent) -> Result<()> {
        let (contact, created) = self
            .contacts
            .find_or_create(
                tenant_id,
                &event.sender_address,
                event.sender_display_name.as_deref(),
            )
            .await?;
        if !created {
            self.contacts
                .adjust_engagement(&contact.id, ENGAGEMENT_INCREMENT)
                .await?;
        }

        let (conversation, _) = self
            .conversations
            .find_or_create_open(tenant_id, &contact.id)
            .await?;

        let message = self
            .messages
            .append(NewMessage::from_contact(
                &conversation.id,
                &event.content,
                &event.content_type,
                json!({
                    "transport_message_id": event.transport_message_id,
                    "timestamp": event.timestamp,
                    "has_media": event.has_media,
                }),
            ))
            .await?;
        self.conversations
            .touch_last_message(&conversation.id, message.created_at)
            .await?;

        // find_or_create_open never hands back a closed conversation, but a
        // concurrent close between the lookup and here reopens.
        if conversation.status == ConversationStatus::Closed {
            self.conversations
                .set_status(&conversation.id, ConversationStatus::Open)
                .await?;
        }

        // Bot state may have just changed (welcome bootstrap races do not
        // exist inside the queue, but config edits do); re-read the row the
        // engine will act on.
        let conversation = match self.conversations.get(&conversation.id).await? {
            Some(conversation) => conversation,
            None => {
                warn!(
                    tenant_id,
                    conversation_id = conversation.id,
                    "conversation vanished mid-ingest"
                );
                return Ok(());
            },
        };

        if conversation.bot_enabled {
            match self.bot_configs.read(tenant_id).await? {
                Some(config) => {
                    self.engine
                        .handle(tenant_id, &conversation, &message, &config)
                        .await?;
                },
                None => {
                    debug!(tenant_id, "no bot configuration; skipping auto-reply");
                },
            }
        }

        self.events
            .emit(Event::MessageIngested {
                tenant_id: tenant_id.to_string(),
                conversation_id: conversation.id.clone(),
                message,
            })
            .await;
        Ok(())
    }
}
