use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use prosa_common::types::now_millis;

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    /// Escalated to a human agent; the bot stays out until re-enabled.
    WaitingAgent,
    Closed,
}

/// The dialog engine's per-conversation memory of where it is in a scripted
/// interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogState {
    pub step: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl DialogState {
    pub const AWAITING_MENU_CHOICE: &'static str = "awaiting_menu_choice";

    #[must_use]
    pub fn awaiting_menu_choice() -> Self {
        Self {
            step: Self::AWAITING_MENU_CHOICE.to_string(),
            context: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn is_awaiting_menu_choice(&self) -> bool {
        self.step == Self::AWAITING_MENU_CHOICE
    }
}

/// An ongoing thread between a tenant and one contact.
///
/// At most one conversation with status != closed exists per
/// (tenant, contact); [`ConversationStore::find_or_create_open`] enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub contact_id: String,
    pub tenant_id: String,
    pub channel_type: String,
    pub status: ConversationStatus,
    pub bot_enabled: bool,
    pub dialog_state: Option<DialogState>,
    pub last_message_at: i64,
    pub created_at: i64,
}

impl Conversation {
    #[must_use]
    pub fn new_open(tenant_id: impl Into<String>, contact_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            contact_id: contact_id.into(),
            tenant_id: tenant_id.into(),
            channel_type: "channel".to_string(),
            status: ConversationStatus::Open,
            bot_enabled: true,
            dialog_state: None,
            last_message_at: now,
            created_at: now,
        }
    }
}

/// Persistent storage for conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Resolve the single non-closed conversation for (tenant, contact),
    /// creating an open bot-enabled one when absent. Returns
    /// `(conversation, created)`. Must be atomic under concurrent calls.
    async fn find_or_create_open(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<(Conversation, bool)>;

    async fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()>;

    async fn set_bot_enabled(&self, conversation_id: &str, enabled: bool) -> Result<()>;

    async fn set_dialog_state(
        &self,
        conversation_id: &str,
        state: Option<DialogState>,
    ) -> Result<()>;

    async fn touch_last_message(&self, conversation_id: &str, at: i64) -> Result<()>;
}
