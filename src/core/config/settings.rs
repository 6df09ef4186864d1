//! Effective runtime settings: command-line flags over environment over the
//! config file over built-in defaults.

use crate::api::models::{self, DEFAULT_MODEL};
use crate::core::client::ClientConfig;
use crate::core::config::data::Config;
use crate::core::config::defaults::{
    DEFAULT_API_URL, DEFAULT_SYSTEM_MESSAGE, DEFAULT_TIMEOUT, ENV_API_KEY, ENV_API_KEYS,
    ENV_API_URL, ENV_HISTORY_PATH, ENV_RATE_LIMIT, ENV_TIMEOUT,
};
use crate::core::keys::KeyRing;
use crate::core::validation::{validate_api_key, validate_api_keys, ValidationError};
use crate::utils::random;
use crate::utils::url::normalize_endpoint;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Values given on the command line. Switches only ever turn features on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub rate_limit: Option<f64>,
    pub stream: bool,
    pub render: bool,
    pub citations: bool,
    pub usage: bool,
}

#[derive(Debug)]
pub enum SettingsError {
    MissingApiKey,
    /// `position` is one-based and only set when several keys were given.
    InvalidApiKey {
        position: Option<usize>,
        source: ValidationError,
    },
    InvalidModel(String),
    InvalidApiUrl(String),
    InvalidRateLimit(f64),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::MissingApiKey => write!(
                f,
                "API key not found. Set {ENV_API_KEYS} or {ENV_API_KEY} environment variable, \
                 or use --api-key flag"
            ),
            SettingsError::InvalidApiKey {
                position: Some(n),
                source,
            } => write!(f, "invalid API key {n}: {source}"),
            SettingsError::InvalidApiKey {
                position: None,
                source,
            } => write!(f, "invalid API key: {source}"),
            SettingsError::InvalidModel(model) => write!(
                f,
                "invalid model specified: {model}. Available models: {}",
                models::available_models_string()
            ),
            SettingsError::InvalidApiUrl(url) => {
                write!(f, "invalid API URL: {url} (expected http:// or https://)")
            }
            SettingsError::InvalidRateLimit(rpm) => write!(
                f,
                "invalid rate limit: {rpm} (expected requests per minute >= 0)"
            ),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::InvalidApiKey { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Settings {
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
    pub rate_limit: f64,
    pub system_prompt: String,
    pub stream: bool,
    pub render: bool,
    pub citations: bool,
    pub usage: bool,
    pub history_path: Option<PathBuf>,
    pub keys: Arc<KeyRing>,
    /// Non-fatal notes about the configured keys.
    pub warnings: Vec<String>,
}

/// Keys from the environment: the comma-separated list first, then the
/// single-key variable.
pub fn keys_from_env(env: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
    if let Some(list) = env(ENV_API_KEYS) {
        let keys: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();
        if !keys.is_empty() {
            return keys;
        }
    }
    env(ENV_API_KEY)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .into_iter()
        .collect()
}

impl Settings {
    /// Resolve against the real process environment.
    pub fn from_env(config: &Config, overrides: &Overrides) -> Result<Self, SettingsError> {
        Self::resolve(config, &|name: &str| std::env::var(name).ok(), overrides)
    }

    pub fn resolve(
        config: &Config,
        env: &dyn Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, SettingsError> {
        let model = overrides
            .model
            .clone()
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if !models::is_valid_model(&model) {
            return Err(SettingsError::InvalidModel(model));
        }

        let raw_url = env(ENV_API_URL)
            .filter(|url| !url.trim().is_empty())
            .or_else(|| config.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url =
            normalize_endpoint(&raw_url).ok_or_else(|| SettingsError::InvalidApiUrl(raw_url))?;

        let timeout = overrides
            .timeout_secs
            .filter(|secs| *secs > 0)
            .or_else(|| env_number::<u64>(env, ENV_TIMEOUT).filter(|secs| *secs > 0))
            .or(config.timeout_secs.filter(|secs| *secs > 0))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let rate_limit = overrides
            .rate_limit
            .or_else(|| env_number::<f64>(env, ENV_RATE_LIMIT))
            .or(config.rate_limit)
            .unwrap_or(0.0);
        if !rate_limit.is_finite() || rate_limit < 0.0 {
            return Err(SettingsError::InvalidRateLimit(rate_limit));
        }

        let history_path = env(ENV_HISTORY_PATH)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| config.history_path.clone())
            .or_else(Config::default_history_path);

        let (keys, warnings) = resolve_keys(env, overrides.api_key.as_deref())?;

        Ok(Self {
            api_url,
            model,
            timeout,
            rate_limit,
            system_prompt: config
                .system_prompt
                .clone()
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string()),
            stream: overrides.stream || config.stream.unwrap_or(false),
            render: overrides.render || config.render.unwrap_or(false),
            citations: overrides.citations || config.citations.unwrap_or(false),
            usage: overrides.usage || config.usage.unwrap_or(false),
            history_path,
            keys: Arc::new(keys),
            warnings,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.api_url.clone(),
            model: self.model.clone(),
            timeout: self.timeout,
            rate_limit: self.rate_limit,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

fn env_number<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = env(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// A flag key is used alone. Environment keys are all validated and the ring
/// starts at a random position to spread load across them.
fn resolve_keys(
    env: &dyn Fn(&str) -> Option<String>,
    flag_key: Option<&str>,
) -> Result<(KeyRing, Vec<String>), SettingsError> {
    if let Some(key) = flag_key.map(str::trim).filter(|key| !key.is_empty()) {
        let check = validate_api_key(key).map_err(|source| SettingsError::InvalidApiKey {
            position: None,
            source,
        })?;
        let warnings = check.warning.into_iter().collect();
        return Ok((KeyRing::new(vec![key.to_string()]), warnings));
    }

    let keys = keys_from_env(env);
    if keys.is_empty() {
        return Err(SettingsError::MissingApiKey);
    }

    let checks = match validate_api_keys(&keys) {
        Ok(checks) => checks,
        Err((position, source)) => {
            return Err(SettingsError::InvalidApiKey {
                position: Some(position),
                source,
            });
        }
    };
    let warnings = checks
        .into_iter()
        .enumerate()
        .filter_map(|(index, check)| {
            let warning = check.warning?;
            Some(if keys.len() > 1 {
                format!("key {}: {warning}", index + 1)
            } else {
                warning
            })
        })
        .collect();

    let start = random::index_below(keys.len());
    Ok((KeyRing::with_start(keys, start), warnings))
}
