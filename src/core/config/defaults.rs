use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SYSTEM_MESSAGE: &str = "Be precise and concise.";

/// Stored as the assistant turn when a request fails, so the conversation
/// keeps alternating roles.
pub const FAILED_RESPONSE_PLACEHOLDER: &str = "I apologize, but I couldn't generate a response.";

/// Comma-separated list of keys.
pub const ENV_API_KEYS: &str = "PERPLEXITY_API_KEYS";
/// A single key, used when the list is unset or empty.
pub const ENV_API_KEY: &str = "PERPLEXITY_API_KEY";
/// Timeout in whole seconds.
pub const ENV_TIMEOUT: &str = "PERPLEXITY_TIMEOUT";
pub const ENV_HISTORY_PATH: &str = "PERPLEXITY_HISTORY_PATH";
/// Requests per minute.
pub const ENV_RATE_LIMIT: &str = "PERPLEXITY_RATE_LIMIT";
pub const ENV_API_URL: &str = "PERPLEXITY_API_URL";
