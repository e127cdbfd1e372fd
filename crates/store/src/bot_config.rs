use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

/// Escalation keywords used when a tenant has not configured any.
pub const DEFAULT_ESCALATION_KEYWORDS: [&str; 4] = ["atendente", "humano", "pessoa", "ajuda"];

/// Upper bound on the configurable reply delay.
pub const MAX_REPLY_DELAY_SECS: u64 = 300;

/// What selecting a menu option does beyond sending its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    /// Hand the conversation over to a human agent.
    Escalate,
}

/// One numbered option in the bot menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<MenuAction>,
}

/// A keyword-triggered canned reply. Rules are scanned in order; the first
/// rule with any substring match fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub reply: String,
}

/// Hour-of-day based default reply used when the bot itself is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackReply {
    /// Service window start hour (0–23).
    pub start_hour: u8,
    /// Service window end hour (1–24, exclusive).
    pub end_hour: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_message: Option<String>,
}

impl Default for FallbackReply {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            open_message: None,
            closed_message: None,
        }
    }
}

/// Per-tenant automated-response configuration.
///
/// Mutable at any time through the CRUD seam; the dialog engine reads it
/// fresh on every invocation so edits take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    pub menu: Vec<MenuOption>,
    pub keyword_rules: Vec<KeywordRule>,
    /// `None` falls back to [`DEFAULT_ESCALATION_KEYWORDS`]; an explicit
    /// empty list disables keyword escalation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_keywords: Option<Vec<String>>,
    /// Acknowledgement sent when escalating to a human agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_message: Option<String>,
    pub reply_delay_secs: u64,
    /// Default reply used when `enabled` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReply>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            welcome_message: None,
            menu: Vec::new(),
            keyword_rules: Vec::new(),
            escalation_keywords: None,
            handoff_message: None,
            reply_delay_secs: 1,
            fallback: None,
        }
    }
}

impl BotConfig {
    /// Configured escalation keywords, or the stock defaults when the tenant
    /// never set any.
    #[must_use]
    pub fn effective_escalation_keywords(&self) -> Vec<&str> {
        match &self.escalation_keywords {
            Some(words) => words.iter().map(String::as_str).collect(),
            None => DEFAULT_ESCALATION_KEYWORDS.to_vec(),
        }
    }

    /// Reject configurations the engine cannot act on. Invalid writes are
    /// refused at the API boundary and never partially applied.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.reply_delay_secs > MAX_REPLY_DELAY_SECS {
            return Err(format!(
                "reply_delay_secs must be at most {MAX_REPLY_DELAY_SECS}"
            ));
        }
        for (i, option) in self.menu.iter().enumerate() {
            if option.text.trim().is_empty() {
                return Err(format!("menu option {} has empty text", i + 1));
            }
        }
        for (i, rule) in self.keyword_rules.iter().enumerate() {
            if rule.keywords.is_empty() {
                return Err(format!("keyword rule {} has no keywords", i + 1));
            }
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(format!("keyword rule {} has an empty keyword", i + 1));
            }
            if rule.reply.trim().is_empty() {
                return Err(format!("keyword rule {} has an empty reply", i + 1));
            }
        }
        if let Some(words) = &self.escalation_keywords
            && words.iter().any(|w| w.trim().is_empty())
        {
            return Err("escalation keywords must be non-empty".to_string());
        }
        if let Some(fallback) = &self.fallback {
            if fallback.start_hour > 23 || fallback.end_hour > 24 {
                return Err("fallback hours must be within a day".to_string());
            }
            if fallback.start_hour as u16 >= fallback.end_hour as u16 {
                return Err("fallback start_hour must precede end_hour".to_string());
            }
        }
        Ok(())
    }
}

/// Persistent storage for per-tenant bot configuration.
#[async_trait]
pub trait BotConfigStore: Send + Sync {
    async fn read(&self, tenant_id: &str) -> Result<Option<BotConfig>>;
    async fn write(&self, tenant_id: &str, config: BotConfig) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: BotConfig = serde_json::from_str(r#"{"welcome_message": "oi"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.welcome_message.as_deref(), Some("oi"));
        assert_eq!(config.reply_delay_secs, 1);
        assert!(config.menu.is_empty());
    }

    #[test]
    fn missing_escalation_keywords_use_defaults() {
        let config = BotConfig::default();
        assert_eq!(
            config.effective_escalation_keywords(),
            DEFAULT_ESCALATION_KEYWORDS.to_vec()
        );
    }

    #[test]
    fn explicit_empty_escalation_keywords_disable_escalation() {
        let config = BotConfig {
            escalation_keywords: Some(vec![]),
            ..Default::default()
        };
        assert!(config.effective_escalation_keywords().is_empty());
    }

    #[test]
    fn validate_rejects_oversized_delay() {
        let config = BotConfig {
            reply_delay_secs: 301,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_keyword_rule() {
        let config = BotConfig {
            keyword_rules: vec![KeywordRule {
                keywords: vec![],
                reply: "hi".into(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_fallback_hours() {
        let config = BotConfig {
            fallback: Some(FallbackReply {
                start_hour: 18,
                end_hour: 9,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn menu_action_serializes_snake_case() {
        let option = MenuOption {
            text: "Suporte".into(),
            reply: Some("Abrindo chamado".into()),
            action: Some(MenuAction::Escalate),
        };
        let json = serde_json::to_value(&option).unwrap();
        assert_eq!(json["action"], "escalate");
    }
}
