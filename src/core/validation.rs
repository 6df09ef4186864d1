//! Input checks for prompts and API keys.

use std::fmt;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_LENGTH: usize = 100_000;
pub const MIN_API_KEY_LENGTH: usize = 20;
pub const MAX_API_KEY_LENGTH: usize = 256;

const EXPECTED_KEY_PREFIX: &str = "pplx-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyPrompt,
    PromptTooLong { chars: usize },
    EmptyApiKey,
    ApiKeyTooShort { len: usize },
    ApiKeyTooLong { len: usize },
    ApiKeyInvalidChar { position: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyPrompt => f.write_str("prompt cannot be empty"),
            ValidationError::PromptTooLong { chars } => write!(
                f,
                "prompt exceeds maximum length: {chars} characters (max: {MAX_PROMPT_LENGTH})"
            ),
            ValidationError::EmptyApiKey => f.write_str("invalid API key format"),
            ValidationError::ApiKeyTooShort { len } => write!(
                f,
                "API key is too short: got {len} characters, minimum is {MIN_API_KEY_LENGTH}"
            ),
            ValidationError::ApiKeyTooLong { len } => write!(
                f,
                "invalid API key format: got {len} characters, maximum is {MAX_API_KEY_LENGTH}"
            ),
            ValidationError::ApiKeyInvalidChar { position } => write!(
                f,
                "API key contains invalid characters: invalid character at position {position}"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Trim a prompt and check it is non-empty and within length.
pub fn validate_prompt(prompt: &str) -> Result<&str, ValidationError> {
    let cleaned = prompt.trim();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    let chars = cleaned.chars().count();
    if chars > MAX_PROMPT_LENGTH {
        return Err(ValidationError::PromptTooLong { chars });
    }
    Ok(cleaned)
}

/// Drop control characters other than newline, carriage return and tab.
pub fn sanitize_prompt(prompt: &str) -> String {
    prompt
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

/// A key that passed validation, with an optional non-fatal note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheck {
    pub warning: Option<String>,
}

pub fn validate_api_key(key: &str) -> Result<KeyCheck, ValidationError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ValidationError::EmptyApiKey);
    }
    if key.len() < MIN_API_KEY_LENGTH {
        return Err(ValidationError::ApiKeyTooShort { len: key.len() });
    }
    if key.len() > MAX_API_KEY_LENGTH {
        return Err(ValidationError::ApiKeyTooLong { len: key.len() });
    }
    if let Some(position) = key
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        .map(|(index, _)| index)
    {
        return Err(ValidationError::ApiKeyInvalidChar { position });
    }

    let warning = (!key.starts_with(EXPECTED_KEY_PREFIX)).then(|| {
        "API key does not start with 'pplx-' prefix; verify it's a valid Perplexity API key"
            .to_string()
    });
    Ok(KeyCheck { warning })
}

/// Check every key in order. The error carries the one-based position of
/// the first key that fails.
pub fn validate_api_keys<S: AsRef<str>>(
    keys: &[S],
) -> Result<Vec<KeyCheck>, (usize, ValidationError)> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| validate_api_key(key.as_ref()).map_err(|err| (index + 1, err)))
        .collect()
}
