//! The bot's decision logic for one inbound message.
//!
//! Decisions follow a fixed order, first match wins: escalation keywords,
//! welcome bootstrap, menu choice, keyword rules, nothing. Configuration is
//! read fresh by the pipeline for every invocation, so edits apply
//! immediately — including mid-menu, where a stale selection is a silent
//! no-match.

use std::{sync::Arc, time::Duration};

use {
    chrono::{Local, Timelike},
    tracing::{debug, info, warn},
};

use {
    prosa_common::types::SenderType,
    prosa_store::{
        BotConfig, Conversation, ConversationStatus, ConversationStore, DialogState, FallbackReply,
        MenuAction, MessageStore, StoredMessage,
    },
};

use crate::{dispatch::Dispatcher, error::Result};

/// Handoff acknowledgement used when the tenant configured none.
pub const DEFAULT_HANDOFF_MESSAGE: &str = "Transferindo para um atendente humano...";

pub struct DialogEngine {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    dispatcher: Arc<Dispatcher>,
}

impl DialogEngine {
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            conversations,
            messages,
            dispatcher,
        }
    }

    /// Decide on and emit at most one automated reply for an inbound contact
    /// message. Runs inside the conversation's queue, so the reply delay
    /// only occupies this conversation.
    pub async fn handle(
        &self,
        tenant_id: &str,
        conversation: &Conversation,
        message: &StoredMessage,
        config: &BotConfig,
    ) -> Result<Option<StoredMessage>> {
        let text = message.content.trim().to_lowercase();

        if !config.enabled {
            if let Some(fallback) = &config.fallback {
                let reply = fallback_text(fallback, Local::now().hour());
                return Ok(self
                    .send_bot_reply(tenant_id, &conversation.id, &reply)
                    .await);
            }
            return Ok(None);
        }

        // 1. Escalation keywords hand the conversation to a human.
        if matches_any(&text, &config.effective_escalation_keywords()) {
            info!(
                tenant_id,
                conversation_id = conversation.id,
                "escalation keyword matched; transferring to agent"
            );
            return self.escalate(tenant_id, conversation, config, None).await;
        }

        // 2. First contact message ever: welcome + menu.
        if let Some(welcome) = &config.welcome_message
            && self.messages.count_from_contact(&conversation.id).await? == 1
        {
            let reply = render_welcome(welcome, config);
            if !config.menu.is_empty() {
                self.conversations
                    .set_dialog_state(
                        &conversation.id,
                        Some(DialogState::awaiting_menu_choice()),
                    )
                    .await?;
            }
            return Ok(self
                .send_bot_reply(tenant_id, &conversation.id, &reply)
                .await);
        }

        // 3. Menu resolution, re-validated against the current config.
        if conversation
            .dialog_state
            .as_ref()
            .is_some_and(DialogState::is_awaiting_menu_choice)
            && let Ok(choice) = text.parse::<usize>()
        {
            if choice >= 1 && choice <= config.menu.len() {
                let option = &config.menu[choice - 1];
                let reply = option
                    .reply
                    .clone()
                    .unwrap_or_else(|| format!("Você escolheu: {}", option.text));
                self.conversations
                    .set_dialog_state(&conversation.id, None)
                    .await?;
                if option.action == Some(MenuAction::Escalate) {
                    return self
                        .escalate(tenant_id, conversation, config, Some(&reply))
                        .await;
                }
                return Ok(self
                    .send_bot_reply(tenant_id, &conversation.id, &reply)
                    .await);
            }
            // Out of range (possibly a config shrink since the menu was
            // shown): silent no-match.
            debug!(
                tenant_id,
                conversation_id = conversation.id,
                choice,
                menu_len = config.menu.len(),
                "menu selection out of range; ignoring"
            );
            return Ok(None);
        }

        // 4. Keyword rules, in configuration order.
        for rule in &config.keyword_rules {
            if matches_any(&text, &rule.keywords.iter().map(String::as_str).collect::<Vec<_>>()) {
                if config.reply_delay_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(config.reply_delay_secs)).await;
                }
                return Ok(self
                    .send_bot_reply(tenant_id, &conversation.id, &rule.reply)
                    .await);
            }
        }

        // 5. Nothing matched.
        Ok(None)
    }

    /// Escalation side effects: bot off, conversation waiting for an agent,
    /// one acknowledgement message (`reply` overrides the handoff text when
    /// a menu option triggered the escalation).
    async fn escalate(
        &self,
        tenant_id: &str,
        conversation: &Conversation,
        config: &BotConfig,
        reply: Option<&str>,
    ) -> Result<Option<StoredMessage>> {
        self.conversations
            .set_bot_enabled(&conversation.id, false)
            .await?;
        self.conversations
            .set_status(&conversation.id, ConversationStatus::WaitingAgent)
            .await?;
        let text = match reply {
            Some(text) => text.to_string(),
            None => config
                .handoff_message
                .clone()
                .unwrap_or_else(|| DEFAULT_HANDOFF_MESSAGE.to_string()),
        };
        Ok(self
            .send_bot_reply(tenant_id, &conversation.id, &text)
            .await)
    }

    /// Dispatch a bot reply. A failed send is not an engine failure: the
    /// message is already persisted as failed and the dialog moves on.
    async fn send_bot_reply(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Option<StoredMessage> {
        match self
            .dispatcher
            .dispatch(tenant_id, conversation_id, text, SenderType::Bot)
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(
                    tenant_id,
                    conversation_id,
                    error = %e,
                    "bot reply not delivered"
                );
                None
            },
        }
    }
}

/// Case-insensitive substring match against any of `needles`.
fn matches_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && text.contains(&needle)
    })
}

/// Welcome message plus the 1-based menu enumeration.
fn render_welcome(welcome: &str, config: &BotConfig) -> String {
    if config.menu.is_empty() {
        return welcome.to_string();
    }
    let options = config
        .menu
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{}. {}", i + 1, option.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{welcome}\n\n{options}")
}

/// Fallback reply for a disabled bot, picked by hour of day.
fn fallback_text(fallback: &FallbackReply, hour: u32) -> String {
    let open = hour >= u32::from(fallback.start_hour) && hour < u32::from(fallback.end_hour);
    if open {
        fallback.open_message.clone().unwrap_or_else(|| {
            "Olá! Obrigado por entrar em contato. Um de nossos atendentes \
             responderá em breve."
                .to_string()
        })
    } else {
        fallback.closed_message.clone().unwrap_or_else(|| {
            format!(
                "Olá! Nosso horário de atendimento é das {}h às {}h. \
                 Responderemos assim que possível.",
                fallback.start_hour, fallback.end_hour
            )
        })
    }
}
