use crate::api::models;
use crate::core::config::io::ConfigError;
use crate::utils::url::normalize_endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Contents of `config.toml`. Every field is optional; unset fields fall
/// back to the environment and then to built-in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Chat completions endpoint, or a base URL it can be derived from
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Requests per minute (0 disables pacing)
    pub rate_limit: Option<f64>,
    pub stream: Option<bool>,
    /// Render markdown with colors and formatting
    pub render: Option<bool>,
    pub citations: Option<bool>,
    pub usage: Option<bool>,
    pub system_prompt: Option<String>,
    pub history_path: Option<PathBuf>,
}

/// Keys accepted by `perplexity config set/unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ApiUrl,
    Model,
    Timeout,
    RateLimit,
    Stream,
    Render,
    Citations,
    Usage,
    SystemPrompt,
    HistoryPath,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 10] = [
        ConfigKey::ApiUrl,
        ConfigKey::Model,
        ConfigKey::Timeout,
        ConfigKey::RateLimit,
        ConfigKey::Stream,
        ConfigKey::Render,
        ConfigKey::Citations,
        ConfigKey::Usage,
        ConfigKey::SystemPrompt,
        ConfigKey::HistoryPath,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::ApiUrl => "api-url",
            ConfigKey::Model => "model",
            ConfigKey::Timeout => "timeout",
            ConfigKey::RateLimit => "rate-limit",
            ConfigKey::Stream => "stream",
            ConfigKey::Render => "render",
            ConfigKey::Citations => "citations",
            ConfigKey::Usage => "usage",
            ConfigKey::SystemPrompt => "system-prompt",
            ConfigKey::HistoryPath => "history-path",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_switch(key: ConfigKey, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected on or off".to_string(),
        }),
    }
}

fn switch_display(value: Option<bool>) -> String {
    match value {
        Some(true) => "on".to_string(),
        Some(false) => "off".to_string(),
        None => "(unset)".to_string(),
    }
}

impl Config {
    /// Parse and store `value` under `key`.
    pub fn set_value(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = value.trim();
        match key {
            ConfigKey::ApiUrl => {
                let endpoint = normalize_endpoint(trimmed)
                    .ok_or_else(|| invalid("expected an http:// or https:// URL"))?;
                self.api_url = Some(endpoint);
            }
            ConfigKey::Model => {
                if !models::is_valid_model(trimmed) {
                    return Err(invalid(&format!(
                        "available models: {}",
                        models::available_models_string()
                    )));
                }
                self.model = Some(trimmed.to_string());
            }
            ConfigKey::Timeout => {
                let secs = trimmed
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| invalid("expected a positive number of seconds"))?;
                self.timeout_secs = Some(secs);
            }
            ConfigKey::RateLimit => {
                let rpm = trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|rpm| rpm.is_finite() && *rpm >= 0.0)
                    .ok_or_else(|| invalid("expected requests per minute, 0 to disable"))?;
                self.rate_limit = Some(rpm);
            }
            ConfigKey::Stream => self.stream = Some(parse_switch(key, value)?),
            ConfigKey::Render => self.render = Some(parse_switch(key, value)?),
            ConfigKey::Citations => self.citations = Some(parse_switch(key, value)?),
            ConfigKey::Usage => self.usage = Some(parse_switch(key, value)?),
            ConfigKey::SystemPrompt => {
                if trimmed.is_empty() {
                    return Err(invalid("system prompt cannot be empty"));
                }
                self.system_prompt = Some(trimmed.to_string());
            }
            ConfigKey::HistoryPath => {
                if trimmed.is_empty() {
                    return Err(invalid("path cannot be empty"));
                }
                self.history_path = Some(PathBuf::from(trimmed));
            }
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::ApiUrl => self.api_url = None,
            ConfigKey::Model => self.model = None,
            ConfigKey::Timeout => self.timeout_secs = None,
            ConfigKey::RateLimit => self.rate_limit = None,
            ConfigKey::Stream => self.stream = None,
            ConfigKey::Render => self.render = None,
            ConfigKey::Citations => self.citations = None,
            ConfigKey::Usage => self.usage = None,
            ConfigKey::SystemPrompt => self.system_prompt = None,
            ConfigKey::HistoryPath => self.history_path = None,
        }
    }

    /// Human-readable value for `config show`.
    pub fn display_value(&self, key: ConfigKey) -> String {
        let unset = || "(unset)".to_string();
        match key {
            ConfigKey::ApiUrl => self.api_url.clone().unwrap_or_else(unset),
            ConfigKey::Model => self.model.clone().unwrap_or_else(unset),
            ConfigKey::Timeout => self
                .timeout_secs
                .map(|secs| format!("{secs}s"))
                .unwrap_or_else(unset),
            ConfigKey::RateLimit => self
                .rate_limit
                .map(|rpm| format!("{rpm}/min"))
                .unwrap_or_else(unset),
            ConfigKey::Stream => switch_display(self.stream),
            ConfigKey::Render => switch_display(self.render),
            ConfigKey::Citations => switch_display(self.citations),
            ConfigKey::Usage => switch_display(self.usage),
            ConfigKey::SystemPrompt => self.system_prompt.clone().unwrap_or_else(unset),
            ConfigKey::HistoryPath => self
                .history_path
                .as_deref()
                .map(path_display)
                .unwrap_or_else(unset),
        }
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for key in ConfigKey::ALL {
            println!("  {key}: {}", self.display_value(key));
        }
    }
}

/// Get a user-friendly display string for a path, using `~` for the home
/// directory on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
