use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use prosa_common::types::now_millis;

/// The persisted descriptor of a tenant's messaging channel: the identity it
/// connected as and whether the channel is currently live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub tenant_id: String,
    /// External address the channel is connected as.
    pub address: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub updated_at: i64,
}

impl ChannelDescriptor {
    #[must_use]
    pub fn connected(
        tenant_id: impl Into<String>,
        address: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            address: address.into(),
            display_name,
            active: true,
            updated_at: now_millis(),
        }
    }
}

/// Persistent storage for channel descriptors (one per tenant).
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<ChannelDescriptor>>;
    async fn upsert(&self, descriptor: ChannelDescriptor) -> Result<()>;
    /// Mark the tenant's channel as no longer live. No-op when absent.
    async fn mark_inactive(&self, tenant_id: &str) -> Result<()>;
}
