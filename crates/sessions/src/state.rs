use {
    serde::Serialize,
    std::time::Duration,
};

use prosa_common::types::now_millis;

/// How long a pairing payload stays valid once issued.
pub const PAIRING_PAYLOAD_TTL: Duration = Duration::from_secs(120);

/// Lifecycle state of a tenant session.
///
/// `Uninitialized → Initializing → AwaitingPairing → Authenticated →
/// Connected`; `Connected → Disconnected` triggers the reconnection policy;
/// `AuthFailed` is terminal and requires a fresh initialize + pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    AwaitingPairing,
    Authenticated,
    Connected,
    Disconnected {
        /// True once the reconnection policy gave up.
        capped: bool,
    },
    AuthFailed,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Authenticated => "authenticated",
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::AuthFailed => "auth_failed",
        }
    }
}

/// An unexpired pairing payload plus its deadline.
#[derive(Debug, Clone, Serialize)]
pub struct PairingPayload {
    pub data: String,
    /// Epoch millis after which the payload must not be shown.
    pub expires_at: i64,
}

impl PairingPayload {
    #[must_use]
    pub fn issue(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            expires_at: now_millis() + PAIRING_PAYLOAD_TTL.as_millis() as i64,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }
}

/// Snapshot of one tenant session, as returned by
/// [`crate::SessionManager::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub pairing_payload: Option<PairingPayload>,
    pub connected_address: Option<String>,
    pub last_error: Option<String>,
}

impl SessionStatus {
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            state: SessionState::Uninitialized,
            pairing_payload: None,
            connected_address: None,
            last_error: None,
        }
    }
}

/// Retry policy applied after an unexpected disconnect: attempt `n` waits
/// `n * base_delay`, and retries stop for good after `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}
