use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use prosa_common::types::now_millis;

/// Engagement score assigned to a contact on first inbound message.
pub const INITIAL_ENGAGEMENT_SCORE: u8 = 50;

/// Engagement bump applied on each subsequent inbound message.
pub const ENGAGEMENT_INCREMENT: i8 = 5;

/// Origin tag for contacts created by the messaging channel itself.
pub const CHANNEL_ORIGIN_TAG: &str = "channel";

/// A person on the other end of the messaging channel.
///
/// Unique per (tenant, external address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub external_address: String,
    pub display_name: Option<String>,
    /// 0–100 engagement score.
    pub engagement_score: u8,
    pub origin_tag: String,
    pub created_at: i64,
}

impl Contact {
    /// Build a new channel-originated contact with default scoring.
    #[must_use]
    pub fn new_from_channel(
        tenant_id: impl Into<String>,
        external_address: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            external_address: external_address.into(),
            display_name,
            engagement_score: INITIAL_ENGAGEMENT_SCORE,
            origin_tag: CHANNEL_ORIGIN_TAG.to_string(),
            created_at: now_millis(),
        }
    }
}

/// Persistent storage for contacts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get(&self, contact_id: &str) -> Result<Option<Contact>>;

    /// Look up a contact by its external address within a tenant.
    async fn get_by_address(&self, tenant_id: &str, address: &str) -> Result<Option<Contact>>;

    /// Resolve the contact for (tenant, address), creating it with channel
    /// defaults when absent. Returns `(contact, created)` where `created` is
    /// true only when this call inserted the record. Must be atomic: two
    /// concurrent calls for the same address never create two contacts.
    async fn find_or_create(
        &self,
        tenant_id: &str,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<(Contact, bool)>;

    /// Adjust the engagement score by `delta`, clamped to 0–100.
    async fn adjust_engagement(&self, contact_id: &str, delta: i8) -> Result<()>;
}
