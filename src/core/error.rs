use crate::api::ErrorResponse;
use std::error::Error as StdError;
use std::fmt;

/// A non-2xx response from the chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build from a response body, using `error.message` when the body is a
    /// JSON error document and the status code otherwise.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let message = ErrorResponse::message_from(body)
            .unwrap_or_else(|| format!("status code {status}"));
        Self { status, message }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error: {}", self.message)
    }
}

impl StdError for ApiError {}

/// The caller's cancellation signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("request cancelled")
    }
}

impl StdError for Cancelled {}

#[derive(Debug)]
pub enum ClientError {
    Cancelled,
    /// No credential is configured.
    MissingApiKey,
    /// The HTTP client could not be built.
    Setup(reqwest::Error),
    /// Sending the request or reading a buffered body failed.
    Transport(reqwest::Error),
    Api(ApiError),
    Encode(serde_json::Error),
    Decode(serde_json::Error),
    /// The event stream broke after the response was accepted.
    Stream(Box<dyn StdError + Send + Sync>),
    /// Every configured key was rejected; carries the last rejection.
    KeysExhausted(ApiError),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// The API rejection behind this error, if there is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) | ClientError::KeysExhausted(err) => Some(err),
            _ => None,
        }
    }

    /// True when the failure happened below HTTP: DNS, connect, TLS, timeouts.
    pub fn is_network(&self) -> bool {
        match self {
            ClientError::Transport(err) => err.is_connect() || err.is_timeout(),
            ClientError::Stream(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Cancelled => f.write_str("request cancelled"),
            ClientError::MissingApiKey => f.write_str("no API key configured"),
            ClientError::Setup(err) => write!(f, "failed to build HTTP client: {err}"),
            ClientError::Transport(err) => write!(f, "failed to send request: {err}"),
            ClientError::Api(err) => write!(f, "{err}"),
            ClientError::Encode(err) => write!(f, "failed to encode request: {err}"),
            ClientError::Decode(err) => write!(f, "failed to parse response: {err}"),
            ClientError::Stream(err) => write!(f, "failed to read stream: {err}"),
            ClientError::KeysExhausted(err) => {
                write!(f, "{err} (no more API keys available)")
            }
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Setup(err) | ClientError::Transport(err) => Some(err),
            ClientError::Api(err) | ClientError::KeysExhausted(err) => Some(err),
            ClientError::Encode(err) | ClientError::Decode(err) => Some(err),
            ClientError::Stream(err) => Some(err.as_ref()),
            ClientError::Cancelled | ClientError::MissingApiKey => None,
        }
    }
}

impl From<Cancelled> for ClientError {
    fn from(_: Cancelled) -> Self {
        ClientError::Cancelled
    }
}
