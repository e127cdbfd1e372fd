use std::sync::Arc;

use tracing::info;

use {
    prosa_auto_reply::{DialogEngine, Dispatcher, IngestionPipeline},
    prosa_common::types::{DeliveryStatus, SenderType},
    prosa_events::EventSink,
    prosa_sessions::{ConnectionInfo, ReconnectPolicy, SessionManager, SessionStatus, Transport},
    prosa_store::{
        BotConfig, BotConfigStore, ChannelStore, ContactStore, ConversationStore, MessageStore,
    },
};

use crate::error::{Error, Result};

/// The five persistence seams the service composes over. Any backend that
/// implements the store traits plugs in here; [`Stores::from_memory`] wires
/// the in-process implementation.
#[derive(Clone)]
pub struct Stores {
    pub contacts: Arc<dyn ContactStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub bot_configs: Arc<dyn BotConfigStore>,
    pub channels: Arc<dyn ChannelStore>,
}

impl Stores {
    /// Back every seam with one shared in-memory store.
    #[must_use]
    pub fn from_memory(store: prosa_store::MemoryStore) -> Self {
        Self {
            contacts: Arc::new(store.clone()),
            conversations: Arc::new(store.clone()),
            messages: Arc::new(store.clone()),
            bot_configs: Arc::new(store.clone()),
            channels: Arc::new(store),
        }
    }
}

/// Outcome of a control-API send, shaped for the CRUD layer.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub delivery_status: DeliveryStatus,
    pub transport_message_id: Option<String>,
}

/// The facade the embedding application talks to: session lifecycle,
/// agent sends, and bot configuration, all per tenant.
///
/// Construction wires the whole core: the session manager feeds inbound
/// events to the ingestion pipeline, the pipeline's dialog engine dispatches
/// replies back through the manager.
pub struct MessagingService {
    sessions: SessionManager,
    stores: Stores,
    dispatcher: Arc<Dispatcher>,
}

impl MessagingService {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        stores: Stores,
        events: Arc<dyn EventSink>,
        policy: ReconnectPolicy,
    ) -> Self {
        let sessions = SessionManager::new(
            transport,
            Arc::clone(&stores.channels),
            Arc::clone(&events),
            policy,
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(sessions.clone()),
            Arc::clone(&stores.contacts),
            Arc::clone(&stores.conversations),
            Arc::clone(&stores.messages),
            Arc::clone(&events),
        ));
        let engine = DialogEngine::new(
            Arc::clone(&stores.conversations),
            Arc::clone(&stores.messages),
            Arc::clone(&dispatcher),
        );
        let pipeline = IngestionPipeline::new(
            Arc::clone(&stores.contacts),
            Arc::clone(&stores.conversations),
            Arc::clone(&stores.messages),
            Arc::clone(&stores.bot_configs),
            engine,
            events,
        );
        sessions.set_inbound_sink(Arc::new(pipeline));
        Self {
            sessions,
            stores,
            dispatcher,
        }
    }

    /// Start (or resume) the tenant's session. `initiator_user_id` is the
    /// operator who asked, recorded for audit only.
    pub async fn initialize(&self, tenant_id: &str, initiator_user_id: &str) -> Result<SessionStatus> {
        info!(tenant_id, initiator_user_id, "session initialize requested");
        Ok(self.sessions.initialize(tenant_id).await?)
    }

    #[must_use]
    pub fn status(&self, tenant_id: &str) -> SessionStatus {
        self.sessions.status(tenant_id)
    }

    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.sessions.connections()
    }

    pub async fn disconnect(&self, tenant_id: &str) -> Result<()> {
        Ok(self.sessions.disconnect(tenant_id).await?)
    }

    /// Send a message to a contact address on behalf of a human agent.
    ///
    /// The contact and open conversation are resolved (created when absent,
    /// with no engagement bump) so the message lands in history exactly like
    /// bot output. A transport failure is reported in the receipt, not as an
    /// error: the record is already persisted as failed.
    pub async fn send_message(
        &self,
        tenant_id: &str,
        address: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        let (contact, _) = self
            .stores
            .contacts
            .find_or_create(tenant_id, address, None)
            .await?;
        let (conversation, _) = self
            .stores
            .conversations
            .find_or_create_open(tenant_id, &contact.id)
            .await?;

        match self
            .dispatcher
            .dispatch(tenant_id, &conversation.id, text, SenderType::Agent)
            .await
        {
            Ok(message) => Ok(SendReceipt {
                delivery_status: message.delivery_status,
                transport_message_id: message
                    .metadata
                    .get("transport_message_id")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            }),
            Err(prosa_auto_reply::Error::Session(_)) => Ok(SendReceipt {
                delivery_status: DeliveryStatus::Failed,
                transport_message_id: None,
            }),
            Err(e) => Err(Error::Pipeline(e)),
        }
    }

    /// The tenant's bot configuration, or the defaults when none is stored.
    pub async fn bot_config(&self, tenant_id: &str) -> Result<BotConfig> {
        Ok(self
            .stores
            .bot_configs
            .read(tenant_id)
            .await?
            .unwrap_or_default())
    }

    /// Replace the tenant's bot configuration. Invalid configurations are
    /// rejected whole; the previous one stays in effect.
    pub async fn set_bot_config(&self, tenant_id: &str, config: BotConfig) -> Result<()> {
        config
            .validate()
            .map_err(|reason| Error::Config { reason })?;
        self.stores.bot_configs.write(tenant_id, config).await?;
        info!(tenant_id, "bot configuration updated");
        Ok(())
    }
}
