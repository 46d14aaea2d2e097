//! Runner settings loaded from TOML and the environment.
//!
//! Settings are resolved in order:
//! 1. Default values
//! 2. A TOML file or string
//! 3. `BATON_*` environment variables
//!
//! ```toml
//! max_turns = 8
//! timeout_secs = 60
//! parallel_tools = true
//! max_tool_concurrency = 4
//! history_limit = 50
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::RunConfig;
use crate::error::ConfigError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BATON_";

/// Error type for settings loading.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// TOML serialization error.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    /// A value is out of range or unparsable.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Scalar runner knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSettings {
    /// Turn budget per run.
    pub max_turns: usize,
    /// Run deadline in seconds.
    pub timeout_secs: u64,
    /// Dispatch multi-call batches concurrently.
    pub parallel_tools: bool,
    /// Cap on concurrently running tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_concurrency: Option<usize>,
    /// Session messages loaded before a run.
    pub history_limit: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_turns: RunConfig::DEFAULT_MAX_TURNS,
            timeout_secs: RunConfig::DEFAULT_TIMEOUT.as_secs(),
            parallel_tools: true,
            max_tool_concurrency: None,
            history_limit: RunConfig::DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl RunnerSettings {
    /// Parse settings from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::TomlParse`] on malformed input or unknown keys.
    pub fn from_toml_str(content: &str) -> SettingsResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the settings as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::TomlSerialize`] if serialization fails.
    pub fn to_toml_string(&self) -> SettingsResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load settings from `path`, falling back to defaults when it does not
    /// exist, then apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override is
    /// unparsable, or the result fails [`validate`](Self::validate).
    pub async fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        let mut settings = if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            debug!(path = %path.display(), "loaded settings file");
            Self::from_toml_str(&content)?
        } else {
            info!(path = %path.display(), "settings file not found, using defaults");
            Self::default()
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `BATON_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSettings`] naming the first unparsable variable.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by full variable name
    /// (for example `BATON_MAX_TURNS`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSettings`] naming the first unparsable variable.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("MAX_TURNS") {
            self.max_turns = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("TIMEOUT_SECS") {
            self.timeout_secs = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("PARALLEL_TOOLS") {
            self.parallel_tools = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_TOOL_CONCURRENCY") {
            let limit: usize = parse(&key, &value)?;
            self.max_tool_concurrency = (limit > 0).then_some(limit);
        }
        if let Some((key, value)) = var("HISTORY_LIMIT") {
            self.history_limit = parse(&key, &value)?;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSettings`] if `max_turns` or
    /// `timeout_secs` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::settings("max_turns must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::settings("timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    /// The run deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build a [`RunConfig`] carrying these settings.
    #[must_use]
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig::new()
            .max_turns(self.max_turns)
            .timeout(self.timeout())
            .parallel_tools(self.parallel_tools)
            .max_tool_concurrency(self.max_tool_concurrency.unwrap_or(0))
            .history_limit(self.history_limit)
    }
}

impl From<&RunnerSettings> for RunConfig {
    fn from(settings: &RunnerSettings) -> Self {
        settings.to_run_config()
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::settings(format!("{key}: cannot parse '{value}'")))
}
