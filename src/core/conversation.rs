use crate::api::{ChatMessage, Role};
use crate::core::config::defaults::FAILED_RESPONSE_PLACEHOLDER;
use crate::core::history::ConversationEntry;
use crate::utils::random;
use chrono::Utc;

fn new_conversation_id() -> String {
    random::hex_id().unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S%f").to_string())
}

/// Message list of the interactive session. The system message is always
/// first; after it roles alternate user/assistant.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<ChatMessage>,
    last_user_input: Option<String>,
    last_response: Option<String>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            id: new_conversation_id(),
            messages: vec![ChatMessage::system(system_prompt)],
            last_user_input: None,
            last_response: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }

    /// True once anything beyond the system message exists.
    pub fn has_exchanges(&self) -> bool {
        self.messages.len() > 1
    }

    pub fn last_user_input(&self) -> Option<&str> {
        self.last_user_input.as_deref()
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ChatMessage::user(content));
        self.last_user_input = Some(content.to_string());
    }

    /// Record the reply; an empty reply is stored as the placeholder.
    pub fn push_assistant(&mut self, content: &str) {
        if content.trim().is_empty() {
            self.record_failure();
            return;
        }
        self.messages.push(ChatMessage::assistant(content));
        self.last_response = Some(content.to_string());
    }

    /// Keep roles alternating after a failed request.
    pub fn record_failure(&mut self) {
        self.messages.push(ChatMessage::assistant(FAILED_RESPONSE_PLACEHOLDER));
    }

    /// Remove the last message unless it is the system message.
    pub fn pop_last(&mut self) -> Option<ChatMessage> {
        if self.messages.len() > 1 {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Drop a trailing user message, as after a cancelled request.
    pub fn discard_pending_user(&mut self) {
        if self.messages.len() > 1
            && self
                .messages
                .last()
                .is_some_and(|message| message.role == Role::User)
        {
            self.messages.pop();
        }
    }

    /// Remove the last exchange and push the last input again. Returns the
    /// input to resend, or `None` when nothing has been sent yet.
    pub fn prepare_retry(&mut self) -> Option<String> {
        let input = self.last_user_input.clone()?;
        if self
            .messages
            .last()
            .is_some_and(|message| message.role == Role::Assistant)
        {
            self.messages.pop();
        }
        self.discard_pending_user();
        self.messages.push(ChatMessage::user(input.as_str()));
        Some(input)
    }

    /// Start over with the current system prompt and a fresh id.
    pub fn reset(&mut self) {
        let system_prompt = self.system_prompt().to_string();
        self.messages = vec![ChatMessage::system(system_prompt)];
        self.id = new_conversation_id();
        self.last_user_input = None;
        self.last_response = None;
    }

    pub fn set_system_prompt(&mut self, prompt: &str) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = prompt.to_string(),
            _ => self.messages.insert(0, ChatMessage::system(prompt)),
        }
    }

    /// Continue a saved conversation. Failed exchanges (placeholder replies
    /// and the user turns that produced them) are left out.
    pub fn resume_from(&mut self, entry: &ConversationEntry) {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(entry.messages.len());
        for message in &entry.messages {
            let failed = message.role == Role::Assistant
                && message.content == FAILED_RESPONSE_PLACEHOLDER;
            if failed {
                if messages
                    .last()
                    .is_some_and(|previous| previous.role == Role::User)
                {
                    messages.pop();
                }
                continue;
            }
            messages.push(message.clone());
        }
        if messages.first().map(|message| message.role) != Some(Role::System) {
            messages.insert(0, ChatMessage::system(self.system_prompt()));
        }

        self.last_user_input = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.clone());
        self.last_response = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.content.clone());
        self.messages = messages;
        self.id = entry.id.clone();
    }

    pub fn to_history_messages(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}
