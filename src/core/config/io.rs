use crate::core::config::data::{path_display, Config, ConfigKey};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Errors raised while reading, writing or editing the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`].
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the configuration file.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    Serialize(toml::ser::Error),

    /// No home or configuration directory could be determined.
    NoConfigDir,

    UnknownKey(String),

    InvalidValue {
        key: ConfigKey,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {source}",
                    path_display(path)
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {source}",
                    path_display(path)
                )
            }
            ConfigError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write config at {}: {source}",
                    path_display(path)
                )
            }
            ConfigError::Serialize(source) => write!(f, "Failed to serialize config: {source}"),
            ConfigError::NoConfigDir => f.write_str("Could not determine the config directory"),
            ConfigError::UnknownKey(key) => {
                let known: Vec<&str> = ConfigKey::ALL.iter().map(|key| key.name()).collect();
                let known = known.join(", ");
                write!(f, "Unknown config key '{key}'. Known keys: {known}")
            }
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid value '{value}' for {key}: {reason}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(source) => Some(source),
            ConfigError::NoConfigDir
            | ConfigError::UnknownKey(_)
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}

impl Config {
    /// Load the file at `config_path`; a missing file is an empty config.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location, or an empty config when there is no
    /// config directory on this platform.
    pub fn load() -> Result<Config, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Config::default()),
        }
    }

    /// Replace the file at `config_path` atomically.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        };
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;

        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(config_path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("ai", "perplexity", "perplexity-cli")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default location of the saved conversations.
    pub fn default_history_path() -> Option<PathBuf> {
        ProjectDirs::from("ai", "perplexity", "perplexity-cli")
            .map(|dirs| dirs.data_dir().join("conversation-history.json"))
    }
}
