//! In-memory store backing tests and database-less deployments.
//!
//! All collections live behind a single async mutex so the find-or-create
//! operations are atomic under concurrent tenant traffic.

use std::{collections::HashMap, sync::Arc};

use {anyhow::Result, async_trait::async_trait, tokio::sync::Mutex};

use prosa_common::types::{DeliveryStatus, now_millis};

use crate::{
    bot_config::{BotConfig, BotConfigStore},
    channel::{ChannelDescriptor, ChannelStore},
    contact::{Contact, ContactStore},
    conversation::{Conversation, ConversationStatus, ConversationStore, DialogState},
    message::{MessageStore, NewMessage, StoredMessage},
};

#[derive(Default)]
struct Inner {
    contacts: Vec<Contact>,
    conversations: Vec<Conversation>,
    /// Append order doubles as the per-conversation message order.
    messages: Vec<StoredMessage>,
    bot_configs: HashMap<String, BotConfig>,
    channels: HashMap<String, ChannelDescriptor>,
}

/// Process-local implementation of every store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn get(&self, contact_id: &str) -> Result<Option<Contact>> {
        let inner = self.inner.lock().await;
        Ok(inner.contacts.iter().find(|c| c.id == contact_id).cloned())
    }

    async fn get_by_address(&self, tenant_id: &str, address: &str) -> Result<Option<Contact>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .contacts
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.external_address == address)
            .cloned())
    }

    async fn find_or_create(
        &self,
        tenant_id: &str,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<(Contact, bool)> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .contacts
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.external_address == address)
        {
            return Ok((existing.clone(), false));
        }
        let contact =
            Contact::new_from_channel(tenant_id, address, display_name.map(str::to_string));
        inner.contacts.push(contact.clone());
        Ok((contact, true))
    }

    async fn adjust_engagement(&self, contact_id: &str, delta: i8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let contact = inner
            .contacts
            .iter_mut()
            .find(|c| c.id == contact_id)
            .ok_or_else(|| anyhow::anyhow!("unknown contact: {contact_id}"))?;
        let score = i16::from(contact.engagement_score) + i16::from(delta);
        contact.engagement_score = score.clamp(0, 100) as u8;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn find_or_create_open(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<(Conversation, bool)> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.conversations.iter().find(|c| {
            c.tenant_id == tenant_id
                && c.contact_id == contact_id
                && c.status != ConversationStatus::Closed
        }) {
            return Ok((existing.clone(), false));
        }
        let conversation = Conversation::new_open(tenant_id, contact_id);
        inner.conversations.push(conversation.clone());
        Ok((conversation, true))
    }

    async fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let conversation = find_conversation_mut(&mut inner, conversation_id)?;
        conversation.status = status;
        Ok(())
    }

    async fn set_bot_enabled(&self, conversation_id: &str, enabled: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let conversation = find_conversation_mut(&mut inner, conversation_id)?;
        conversation.bot_enabled = enabled;
        Ok(())
    }

    async fn set_dialog_state(
        &self,
        conversation_id: &str,
        state: Option<DialogState>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let conversation = find_conversation_mut(&mut inner, conversation_id)?;
        conversation.dialog_state = state;
        Ok(())
    }

    async fn touch_last_message(&self, conversation_id: &str, at: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let conversation = find_conversation_mut(&mut inner, conversation_id)?;
        conversation.last_message_at = conversation.last_message_at.max(at);
        Ok(())
    }
}

fn find_conversation_mut<'a>(
    inner: &'a mut Inner,
    conversation_id: &str,
) -> Result<&'a mut Conversation> {
    inner
        .conversations
        .iter_mut()
        .find(|c| c.id == conversation_id)
        .ok_or_else(|| anyhow::anyhow!("unknown conversation: {conversation_id}"))
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: NewMessage) -> Result<StoredMessage> {
        let mut inner = self.inner.lock().await;
        // created_at never goes below the conversation's last message.
        let floor = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == message.conversation_id)
            .map(|m| m.created_at)
            .max()
            .unwrap_or(0);
        let stored = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: message.conversation_id,
            sender_type: message.sender_type,
            content: message.content,
            content_type: message.content_type,
            metadata: message.metadata,
            delivery_status: message.delivery_status,
            read: message.read,
            created_at: now_millis().max(floor),
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn update_delivery(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        transport_message_id: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| anyhow::anyhow!("unknown message: {message_id}"))?;
        message.delivery_status = status;
        if let Some(transport_id) = transport_message_id {
            if !message.metadata.is_object() {
                message.metadata = serde_json::json!({});
            }
            if let Some(map) = message.metadata.as_object_mut() {
                map.insert(
                    "transport_message_id".to_string(),
                    serde_json::Value::String(transport_id.to_string()),
                );
            }
        }
        Ok(())
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn count_from_contact(&self, conversation_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == conversation_id
                    && m.sender_type == prosa_common::types::SenderType::Contact
            })
            .count() as u64)
    }
}

#[async_trait]
impl BotConfigStore for MemoryStore {
    async fn read(&self, tenant_id: &str) -> Result<Option<BotConfig>> {
        let inner = self.inner.lock().await;
        Ok(inner.bot_configs.get(tenant_id).cloned())
    }

    async fn write(&self, tenant_id: &str, config: BotConfig) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.bot_configs.insert(tenant_id.to_string(), config);
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<ChannelDescriptor>> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.get(tenant_id).cloned())
    }

    async fn upsert(&self, descriptor: ChannelDescriptor) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .channels
            .insert(descriptor.tenant_id.clone(), descriptor);
        Ok(())
    }

    async fn mark_inactive(&self, tenant_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(descriptor) = inner.channels.get_mut(tenant_id) {
            descriptor.active = false;
            descriptor.updated_at = now_millis();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, prosa_common::types::SenderType};

    #[tokio::test]
    async fn find_or_create_contact_is_idempotent() {
        let store = MemoryStore::new();
        let (first, created) = store
            .find_or_create("t1", "5511999990000", Some("Ana"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.engagement_score, 50);
        assert_eq!(first.origin_tag, "channel");

        let (second, created) = store
            .find_or_create("t1", "5511999990000", None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn concurrent_resolution_creates_one_contact() {
        let store = MemoryStore::new();
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(
                    async move { store.find_or_create("t1", "5511999990000", None).await },
                )
            })
            .collect();
        let mut created_count = 0;
        for task in tasks {
            let (_, created) = task.await.unwrap().unwrap();
            if created {
                created_count += 1;
            }
        }
        assert_eq!(created_count, 1);
    }

    #[tokio::test]
    async fn same_tenant_contact_has_one_open_conversation() {
        let store = MemoryStore::new();
        let (a, created_a) = store.find_or_create_open("t1", "c1").await.unwrap();
        let (b, created_b) = store.find_or_create_open("t1", "c1").await.unwrap();
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);

        // Escalated conversations still count as the open one.
        store
            .set_status(&a.id, ConversationStatus::WaitingAgent)
            .await
            .unwrap();
        let (c, created_c) = store.find_or_create_open("t1", "c1").await.unwrap();
        assert!(!created_c);
        assert_eq!(c.id, a.id);

        // Closing it lets a fresh one be created.
        store
            .set_status(&a.id, ConversationStatus::Closed)
            .await
            .unwrap();
        let (d, created_d) = store.find_or_create_open("t1", "c1").await.unwrap();
        assert!(created_d);
        assert_ne!(d.id, a.id);
    }

    #[tokio::test]
    async fn engagement_score_caps_at_100() {
        let store = MemoryStore::new();
        let (contact, _) = store.find_or_create("t1", "addr", None).await.unwrap();
        for _ in 0..20 {
            store.adjust_engagement(&contact.id, 5).await.unwrap();
        }
        let reloaded = store.get_by_address("t1", "addr").await.unwrap().unwrap();
        assert_eq!(reloaded.engagement_score, 100);
    }

    #[tokio::test]
    async fn append_assigns_non_decreasing_timestamps() {
        let store = MemoryStore::new();
        let mut last = 0;
        for i in 0..10 {
            let stored = store
                .append(NewMessage::from_contact(
                    "conv",
                    format!("m{i}"),
                    "chat",
                    serde_json::Value::Null,
                ))
                .await
                .unwrap();
            assert!(stored.created_at >= last);
            last = stored.created_at;
        }
    }

    #[tokio::test]
    async fn update_delivery_attaches_transport_id() {
        let store = MemoryStore::new();
        let stored = store
            .append(NewMessage::outbound("conv", SenderType::Bot, "hello"))
            .await
            .unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Pending);

        store
            .update_delivery(&stored.id, DeliveryStatus::Sent, Some("wamid.123"))
            .await
            .unwrap();
        let messages = store.list_by_conversation("conv").await.unwrap();
        assert_eq!(messages[0].delivery_status, DeliveryStatus::Sent);
        assert_eq!(messages[0].metadata["transport_message_id"], "wamid.123");
    }

    #[tokio::test]
    async fn count_from_contact_ignores_bot_messages() {
        let store = MemoryStore::new();
        store
            .append(NewMessage::from_contact(
                "conv",
                "oi",
                "chat",
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        store
            .append(NewMessage::outbound("conv", SenderType::Bot, "welcome"))
            .await
            .unwrap();
        assert_eq!(store.count_from_contact("conv").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn channel_descriptor_upsert_and_deactivate() {
        let store = MemoryStore::new();
        store
            .upsert(ChannelDescriptor::connected(
                "t1",
                "5511988887777",
                Some("Loja".into()),
            ))
            .await
            .unwrap();
        assert!(ChannelStore::get(&store, "t1").await.unwrap().unwrap().active);

        store.mark_inactive("t1").await.unwrap();
        assert!(!ChannelStore::get(&store, "t1").await.unwrap().unwrap().active);
    }
}
