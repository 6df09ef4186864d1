//! State and request flow of the interactive chat session.

use crate::api::{ChatResponse, Usage};
use crate::core::client::ApiClient;
use crate::core::conversation::Conversation;
use crate::core::error::ClientError;
use crate::core::history::History;
use crate::ui::display::Display;
use crate::ui::spinner::Spinner;
use crate::utils::clipboard::{copy_to_clipboard, ClipboardError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const THINKING: &str = "Thinking...";

pub type ClipboardFn = fn(&str) -> Result<(), ClipboardError>;

/// One answered request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub citations: Vec<String>,
    pub usage: Option<Usage>,
}

impl Reply {
    pub fn from_response(content: String, response: Option<&ChatResponse>) -> Self {
        Self {
            content,
            citations: response
                .map(|response| response.citations.clone())
                .unwrap_or_default(),
            usage: response
                .map(|response| response.usage)
                .filter(|usage| usage.total_tokens > 0),
        }
    }
}

/// How a message send ended, after the conversation has been updated.
#[derive(Debug)]
pub enum SendOutcome {
    Answered,
    Cancelled,
    Failed(ClientError),
}

pub struct Session {
    pub client: ApiClient,
    pub conversation: Conversation,
    pub history: Option<History>,
    pub display: Display,
    pub citations: bool,
    pub usage: bool,
    pub render: bool,
    pub stream: bool,
    pub spinner: bool,
    pub clipboard: ClipboardFn,
    default_system_prompt: String,
}

impl Session {
    pub fn new(client: ApiClient, display: Display, system_prompt: &str) -> Self {
        Self {
            client,
            conversation: Conversation::new(system_prompt),
            history: None,
            display,
            citations: false,
            usage: false,
            render: false,
            stream: false,
            spinner: true,
            clipboard: copy_to_clipboard,
            default_system_prompt: system_prompt.to_string(),
        }
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn default_system_prompt(&self) -> &str {
        &self.default_system_prompt
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Store the current conversation and write the history file. Does
    /// nothing until the conversation has at least one exchange.
    pub fn save_history(&mut self) {
        if !self.conversation.has_exchanges() {
            return;
        }
        let Some(history) = self.history.as_mut() else {
            return;
        };
        history.upsert(
            self.conversation.id(),
            self.client.model(),
            self.conversation.to_history_messages(),
        );
        if let Err(err) = history.save() {
            warn!(error = %err, "could not save history");
            self.display.warning(format!("Warning: Could not save history: {err}"));
        }
    }

    /// Send a new user message and record the reply.
    pub async fn send_message(&mut self, input: &str, cancel: &CancellationToken) -> SendOutcome {
        self.conversation.push_user(input);
        self.display.blank();

        match self.exchange(cancel).await {
            Ok(reply) => {
                self.finish_reply(reply);
                SendOutcome::Answered
            }
            Err(err) if err.is_cancelled() => {
                self.conversation.discard_pending_user();
                SendOutcome::Cancelled
            }
            Err(err) => {
                self.display.client_error(&err);
                // Keeps user/assistant alternation for the next turn.
                self.conversation.record_failure();
                SendOutcome::Failed(err)
            }
        }
    }

    /// Resend the last user input in place of the last exchange. Returns
    /// `None` when there is nothing to retry.
    pub async fn retry(&mut self, cancel: &CancellationToken) -> Option<SendOutcome> {
        let Some(input) = self.conversation.prepare_retry() else {
            self.display.line("No previous message to retry.");
            return None;
        };
        self.display.line(format!("Retrying: {input}"));
        self.display.blank();

        let outcome = match self.exchange(cancel).await {
            Ok(reply) => {
                self.finish_reply(reply);
                SendOutcome::Answered
            }
            Err(err) if err.is_cancelled() => {
                self.conversation.discard_pending_user();
                SendOutcome::Cancelled
            }
            Err(err) => {
                self.display.client_error(&err);
                self.conversation.discard_pending_user();
                SendOutcome::Failed(err)
            }
        };
        Some(outcome)
    }

    fn finish_reply(&mut self, reply: Reply) {
        self.conversation.push_assistant(&reply.content);
        if self.citations && !reply.citations.is_empty() {
            self.display.citations(&reply.citations);
        }
        if self.usage {
            if let Some(usage) = &reply.usage {
                self.display.usage(usage);
            }
        }
        self.display.blank();
    }

    /// Send the whole conversation and print the answer.
    async fn exchange(&mut self, cancel: &CancellationToken) -> Result<Reply, ClientError> {
        let Session {
            client,
            conversation,
            display,
            render,
            stream,
            spinner,
            ..
        } = self;
        let messages = conversation.messages();
        debug!(
            messages = messages.len(),
            stream = *stream,
            "sending conversation"
        );

        let mut indicator = (*spinner).then(|| Spinner::start(THINKING));

        if *stream {
            let mut trailer = None;
            let result = client
                .query_stream_with_history_cancellable(
                    messages,
                    cancel,
                    |chunk| {
                        if let Some(indicator) = indicator.as_mut() {
                            indicator.stop();
                        }
                        display.chunk(chunk);
                    },
                    |response| trailer = Some(response.clone()),
                )
                .await;
            if let Some(indicator) = indicator.as_mut() {
                indicator.stop();
            }
            let content = result?;
            if *render {
                display.line("\n---");
                display.content(&content, true);
            } else {
                display.blank();
            }
            return Ok(Reply::from_response(content, trailer.as_ref()));
        }

        let result = client
            .query_with_history_cancellable(messages, cancel)
            .await;
        if let Some(indicator) = indicator.as_mut() {
            indicator.stop();
        }
        let response = result?;
        let content = response.content().to_string();
        display.content(&content, *render);
        Ok(Reply::from_response(content, Some(&response)))
    }
}
