//! Client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{message::DEFAULT_MSG_LENGTH_LIMIT, traits::SignInRequest};

/// Config file location relative to the user config directory.
const CONFIG_FILE: &str = "friendlychat/config.json";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// FriendlyChat client configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Collection path holding the messages.
    pub messages_path: String,
    /// Maximum characters per message.
    pub message_length_limit: usize,
    /// Sign-in flow parameters.
    pub sign_in: SignInRequest,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            messages_path: "messages".to_string(),
            message_length_limit: DEFAULT_MSG_LENGTH_LIMIT,
            sign_in: SignInRequest::default(),
        }
    }
}

impl ChatConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use the defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but is invalid.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from the per-user config directory, falling back to defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but is invalid.
    pub fn from_user_config() -> Result<Self, ConfigError> {
        match Self::user_config_path() {
            Some(path) => Self::load_or_default(&path),
            None => Ok(Self::default()),
        }
    }

    /// Path of the per-user config file, if the platform has a config dir.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Check the values are usable.
    ///
    /// # Errors
    /// Returns error describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.messages_path.trim().is_empty() {
            return Err(ConfigError::Invalid("messages_path is empty".to_string()));
        }
        if self.message_length_limit == 0 {
            return Err(ConfigError::Invalid(
                "message_length_limit must be positive".to_string(),
            ));
        }
        if self.sign_in.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "sign_in.providers must list at least one provider".to_string(),
            ));
        }
        Ok(())
    }
}
