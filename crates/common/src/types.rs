use {
    chrono::Utc,
    serde::{Deserialize, Serialize},
};

/// Current time as epoch milliseconds. All persisted timestamps use this.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A raw inbound message event as delivered by the transport, before any
/// contact or conversation resolution has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// External address of the sender (e.g. a phone number).
    pub sender_address: String,
    /// Display name reported by the transport, if any.
    pub sender_display_name: Option<String>,
    pub content: String,
    /// Transport content type (e.g. "chat", "image").
    pub content_type: String,
    /// Message id assigned by the messaging network.
    pub transport_message_id: Option<String>,
    /// Transport-reported timestamp (epoch millis).
    pub timestamp: i64,
    pub has_media: bool,
    /// True when the message originated in a group chat.
    pub is_group: bool,
}

/// Who authored a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Contact,
    Bot,
    Agent,
}

impl SenderType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Bot => "bot",
            Self::Agent => "agent",
        }
    }
}

/// Delivery state of an outbound (or inbound) message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// Acknowledgement returned by the transport for a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAck {
    /// Message id assigned by the messaging network, when available.
    pub transport_message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SenderType::Contact).unwrap(),
            "\"contact\""
        );
        assert_eq!(SenderType::Agent.as_str(), "agent");
    }

    #[test]
    fn delivery_status_roundtrip() {
        let status: DeliveryStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, DeliveryStatus::Failed);
    }
}
