//! Runtime configuration for the rehasport services.
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! document is a valid configuration.

use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error as ThisError;

/// Upper bound accepted for `enrollment.max_retries`.
pub const MAX_RETRY_LIMIT: u32 = 16;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

///
/// Config
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub enrollment: EnrollmentConfig,
    pub identity: IdentityConfig,
    pub feed: FeedConfig,
}

impl Config {
    /// Parse and validate a configuration document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse, and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retries = self.enrollment.max_retries;
        if retries == 0 || retries > MAX_RETRY_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "enrollment.max_retries must be within 1..={MAX_RETRY_LIMIT}, got {retries}"
            )));
        }
        if self.enrollment.lock_prune_threshold == 0 {
            return Err(ConfigError::Invalid(
                "enrollment.lock_prune_threshold must be positive".to_string(),
            ));
        }
        if self.identity.default_role == DefaultRole::Admin {
            return Err(ConfigError::Invalid(
                "identity.default_role must not grant admin".to_string(),
            ));
        }
        if self.feed.dedup_capacity == 0 || self.feed.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "feed capacities must be positive".to_string(),
            ));
        }
        if self.feed.max_message_len == 0 {
            return Err(ConfigError::Invalid(
                "feed.max_message_len must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

///
/// EnrollmentConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnrollmentConfig {
    /// Attempts made on an optimistic commit before surfacing contention.
    pub max_retries: u32,

    /// Idle per-course locks are dropped once the lock table grows past this.
    pub lock_prune_threshold: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lock_prune_threshold: 1024,
        }
    }
}

///
/// IdentityConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Role assigned on first login when signup metadata carries none.
    pub default_role: DefaultRole,
}

///
/// DefaultRole
///
/// Role names accepted in configuration. Mirrors the runtime role enum
/// without depending on it.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRole {
    Admin,
    #[serde(alias = "therapist")]
    Trainer,
    #[default]
    Patient,
}

///
/// FeedConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Message ids remembered per subscriber for deduplication.
    pub dedup_capacity: usize,

    /// Buffered events per broadcast channel.
    pub channel_capacity: usize,

    /// Maximum message length in characters after trimming.
    pub max_message_len: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 4096,
            channel_capacity: 256,
            max_message_len: 4000,
        }
    }
}

///
/// TESTS
///
