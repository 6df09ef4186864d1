//! Chat completions client.
//!
//! Every request runs inside two loops. The inner one ([`execute_with_retry`])
//! absorbs transient network failures with the same key. The outer one moves
//! to the next key when the API rejects the current one. For streamed
//! requests both loops cover only connection establishment; once the server
//! has accepted the request, failures are reported as-is.

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::chat_stream::read_event_stream;
use crate::core::error::{ApiError, ClientError};
use crate::core::keys::{should_rotate, KeyRing, KeyRotation};
use crate::core::pacer::Pacer;
use crate::core::retry::{execute_with_retry, RetryCallback, RetryInfo, RetryPolicy};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub type KeyRotationCallback = Arc<dyn Fn(KeyRotation) + Send + Sync>;

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    /// Requests per minute; `0` disables pacing.
    pub rate_limit: f64,
    pub system_prompt: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    system_prompt: String,
    keys: Arc<KeyRing>,
    pacer: Pacer,
    retry_policy: RetryPolicy,
    on_key_rotation: Option<KeyRotationCallback>,
    on_retry: Option<RetryCallback>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, keys: Arc<KeyRing>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Setup)?;
        Ok(Self::with_http_client(http, config, keys))
    }

    /// Use a prepared HTTP client; its own timeout settings apply.
    pub fn with_http_client(
        http: reqwest::Client,
        config: ClientConfig,
        keys: Arc<KeyRing>,
    ) -> Self {
        let pacer = Pacer::new(config.rate_limit);
        debug!(
            endpoint = %config.endpoint,
            keys = keys.len(),
            pacing = ?pacer.interval(),
            "client ready"
        );
        Self {
            http,
            endpoint: config.endpoint,
            model: config.model,
            system_prompt: config.system_prompt,
            keys,
            pacer,
            retry_policy: RetryPolicy::default(),
            on_key_rotation: None,
            on_retry: None,
        }
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Called with one-based positions after every key switch.
    pub fn on_key_rotation<F>(&mut self, callback: F)
    where
        F: Fn(KeyRotation) + Send + Sync + 'static,
    {
        self.on_key_rotation = Some(Arc::new(callback));
    }

    /// Called before each backoff sleep of the transient-retry loop.
    pub fn on_retry<F>(&mut self, callback: F)
    where
        F: Fn(&RetryInfo) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
    }

    fn single_turn(&self, prompt: &str) -> [ChatMessage; 2] {
        [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ]
    }

    pub async fn query(&self, prompt: &str) -> Result<ChatResponse, ClientError> {
        self.query_cancellable(prompt, &CancellationToken::new()).await
    }

    pub async fn query_cancellable(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ClientError> {
        let messages = self.single_turn(prompt);
        self.query_with_history_cancellable(&messages, cancel).await
    }

    pub async fn query_with_history(
        &self,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, ClientError> {
        self.query_with_history_cancellable(messages, &CancellationToken::new()).await
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    pub async fn query_with_history_cancellable(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ClientError> {
        self.with_key_rotation(cancel, |key| self.complete(messages, key, cancel)).await
    }

    pub async fn query_stream(
        &self,
        prompt: &str,
        on_chunk: impl FnMut(&str),
        on_done: impl FnOnce(&ChatResponse),
    ) -> Result<String, ClientError> {
        self.query_stream_cancellable(prompt, &CancellationToken::new(), on_chunk, on_done).await
    }

    pub async fn query_stream_cancellable(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        on_chunk: impl FnMut(&str),
        on_done: impl FnOnce(&ChatResponse),
    ) -> Result<String, ClientError> {
        let messages = self.single_turn(prompt);
        self.query_stream_with_history_cancellable(&messages, cancel, on_chunk, on_done).await
    }

    pub async fn query_stream_with_history(
        &self,
        messages: &[ChatMessage],
        on_chunk: impl FnMut(&str),
        on_done: impl FnOnce(&ChatResponse),
    ) -> Result<String, ClientError> {
        self.query_stream_with_history_cancellable(
            messages,
            &CancellationToken::new(),
            on_chunk,
            on_done,
        )
        .await
    }

    /// Stream a completion. `on_chunk` receives text deltas in order;
    /// `on_done` receives the citations/usage trailer when the server sent
    /// one. Returns the full text.
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    pub async fn query_stream_with_history_cancellable(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
        on_chunk: impl FnMut(&str),
        on_done: impl FnOnce(&ChatResponse),
    ) -> Result<String, ClientError> {
        let response = self
            .with_key_rotation(cancel, |key| self.open_stream(messages, key, cancel))
            .await?;
        read_event_stream(response.bytes_stream(), cancel, on_chunk, on_done).await
    }

    /// Run `attempt` with the current key, switching keys while the API keeps
    /// rejecting them with a rotatable error.
    async fn with_key_rotation<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if self.keys.len() <= 1 {
            let key = self.keys.current_key().ok_or(ClientError::MissingApiKey)?;
            return attempt(key).await;
        }

        loop {
            let key = self.keys.current_key().ok_or(ClientError::MissingApiKey)?;
            let err = match attempt(key).await {
                Ok(value) => {
                    self.keys.reset_cycle();
                    return Ok(value);
                }
                Err(err) => err,
            };

            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let api = match err {
                ClientError::Api(api) if should_rotate(api.status, &api.message) => api,
                other => return Err(other),
            };

            match self.keys.rotate() {
                Ok(rotation) => {
                    info!(
                        from = rotation.from,
                        to = rotation.to,
                        total = rotation.total,
                        status = api.status,
                        "switching API key"
                    );
                    if let Some(callback) = &self.on_key_rotation {
                        callback(rotation);
                    }
                }
                Err(_) => {
                    warn!(status = api.status, "every API key was rejected");
                    return Err(ClientError::KeysExhausted(api));
                }
            }
        }
    }

    fn encode(&self, messages: &[ChatMessage], stream: bool) -> Result<Vec<u8>, ClientError> {
        serde_json::to_vec(&ChatRequest {
            model: &self.model,
            messages,
            stream,
        })
        .map_err(ClientError::Encode)
    }

    fn request(&self, body: &[u8], key: &str, accept: &'static str) -> reqwest::RequestBuilder {
        self.http
            .post(&self.endpoint)
            .header(ACCEPT, accept)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(key)
            .body(body.to_vec())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            sent = request.send() => sent.map_err(ClientError::Transport),
        }
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            body = response.bytes() => {
                body.map(|bytes| bytes.to_vec()).map_err(ClientError::Transport)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        key: String,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ClientError> {
        self.pacer.wait(cancel).await?;
        let body = self.encode(messages, false)?;
        execute_with_retry(&self.retry_policy, cancel, self.on_retry.as_ref(), || {
            self.complete_once(&body, &key, cancel)
        })
        .await
    }

    async fn complete_once(
        &self,
        body: &[u8],
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ClientError> {
        let response = self
            .send(self.request(body, key, "application/json"), cancel)
            .await?;
        let status = response.status();
        let bytes = self.read_body(response, cancel).await?;
        if !status.is_success() {
            let err = ApiError::from_body(status.as_u16(), &bytes);
            debug!(status = err.status, message = %err.message, "request rejected");
            return Err(ClientError::Api(err));
        }
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }

    async fn open_stream(
        &self,
        messages: &[ChatMessage],
        key: String,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        self.pacer.wait(cancel).await?;
        let body = self.encode(messages, true)?;
        execute_with_retry(&self.retry_policy, cancel, self.on_retry.as_ref(), || {
            self.open_stream_once(&body, &key, cancel)
        })
        .await
    }

    async fn open_stream_once(
        &self,
        body: &[u8],
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .send(self.request(body, key, "text/event-stream"), cancel)
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let bytes = self.read_body(response, cancel).await?;
        let err = ApiError::from_body(status.as_u16(), &bytes);
        debug!(status = err.status, message = %err.message, "stream request rejected");
        Err(ClientError::Api(err))
    }
}
