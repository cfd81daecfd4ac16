//! Configuration loading and validation for chatstack.
//!
//! Loads configuration from `~/.chatstack/config.toml` with environment
//! variable overrides. Every key is optional; the defaults describe a
//! `gpt-3.5-turbo` session with a 200-token response reserve.

use chatstack_core::{BudgetConfig, Model};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatstack/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tokens reserved for the response; max input is the model window minus this
    #[serde(default = "default_min_response_tokens")]
    pub min_response_tokens: usize,

    /// Cap on generated tokens per response
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Number of recent user/assistant turns considered per request
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Text of the system turn sent first on every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Provider connection settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Transient-error retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_min_response_tokens() -> usize {
    200
}
fn default_max_response_tokens() -> u32 {
    400
}
fn default_max_history_messages() -> usize {
    10
}
fn default_system_prompt() -> String {
    "You are a clever bot. Do not apologize, or make excuses. \
     Do not mention that you are an AI language model since that is annoying to users."
        .into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("min_response_tokens", &self.min_response_tokens)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("max_history_messages", &self.max_history_messages)
            .field("system_prompt", &self.system_prompt)
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Connection settings for the OpenAI-compatible endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// How transient provider errors are retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    10
}
fn default_delay_ms() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl ChatConfig {
    /// Load configuration from the default path (~/.chatstack/config.toml).
    ///
    /// Environment overrides:
    /// - `CHATSTACK_API_KEY`, then `OPENAI_API_KEY` (when the file sets no key)
    /// - `CHATSTACK_MODEL`
    /// - `CHATSTACK_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply the overrides `load()` reads from the environment, looking
    /// each variable up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key =
                lookup("CHATSTACK_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("CHATSTACK_MODEL") {
            self.model = model;
        }

        if let Some(url) = lookup("CHATSTACK_API_URL") {
            self.provider.api_url = url;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatstack")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let model: Model = self.model.parse().map_err(|_| {
            ConfigError::ValidationError(format!("unsupported model '{}'", self.model))
        })?;

        if self.min_response_tokens >= model.context_window() {
            return Err(ConfigError::ValidationError(format!(
                "min_response_tokens ({}) must be below the {} context window ({})",
                self.min_response_tokens,
                model,
                model.context_window()
            )));
        }

        if self.max_response_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_response_tokens must be > 0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Budget parameters described by this configuration.
    pub fn budget(&self) -> Result<BudgetConfig, ConfigError> {
        let budget = BudgetConfig::new(&self.model)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?
            .with_min_response_tokens(self.min_response_tokens)
            .with_max_response_tokens(self.max_response_tokens)
            .with_max_history_messages(self.max_history_messages)
            .with_temperature(self.temperature);
        budget
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(budget)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            min_response_tokens: default_min_response_tokens(),
            max_response_tokens: default_max_response_tokens(),
            max_history_messages: default_max_history_messages(),
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for chatstack_core::Error {
    fn from(err: ConfigError) -> Self {
        chatstack_core::Error::config(err.to_string())
    }
}
