//! Configuration loading, validation, and management for skiff.
//!
//! Loads settings from `~/.skiff/config.toml` with environment variable
//! overrides. The agent loop reads a `Settings` value as a read-only snapshot
//! taken when the run starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.skiff/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Chat-completion endpoint base URL (e.g. `https://api.openai.com/v1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Credential sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Iteration cap for one agent run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,

    /// Web search / page extraction
    #[serde(default)]
    pub search: SearchConfig,

    /// Tool execution limits
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    50
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("features", &self.features)
            .field("search", &self.search)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Expose the Memory tool and prefix new prompts with stored memories
    #[serde(default)]
    pub memory: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tavily credential; WebSearch and ExtractPageContent are unavailable without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub base_url: String,
}

fn default_search_url() -> String {
    "https://api.tavily.com".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_url(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,

    /// Tool output longer than this is truncated
    #[serde(default = "default_max_output")]
    pub max_output_chars: usize,

    /// Bash commands containing any of these substrings are refused
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,
}

fn default_bash_timeout() -> u64 {
    120
}
fn default_max_output() -> usize {
    30_000
}
fn default_blocked_commands() -> Vec<String> {
    vec![
        "rm -rf /".into(),
        "mkfs".into(),
        "dd if=".into(),
        ":(){ :|:& };:".into(),
        "shutdown".into(),
        "reboot".into(),
    ]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_timeout_secs: default_bash_timeout(),
            max_output_chars: default_max_output(),
            blocked_commands: default_blocked_commands(),
        }
    }
}

/// The validated pieces the agent loop cannot start without.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEndpoint {
    pub api_url: String,
    pub model: String,
}

impl Settings {
    /// Load settings from the default path (~/.skiff/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SKIFF_API_URL`, `SKIFF_MODEL`
    /// - `SKIFF_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `TAVILY_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut settings = Self::load_from(&config_path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SKIFF_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(model) = lookup("SKIFF_MODEL") {
            self.model = Some(model);
        }
        if let Some(key) = lookup("SKIFF_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(key) = lookup("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".skiff")
    }

    /// Directory for JSONL session logs.
    pub fn sessions_dir() -> PathBuf {
        Self::config_dir().join("sessions")
    }

    /// Path of the JSONL memory file.
    pub fn memory_path() -> PathBuf {
        Self::config_dir().join("memory").join("memories.jsonl")
    }

    /// Validate value ranges. Presence of endpoint and model is checked separately
    /// by [`Settings::require_model_endpoint`] when a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// The endpoint and model, or the first missing field.
    pub fn require_model_endpoint(&self) -> Result<ModelEndpoint, ConfigError> {
        let api_url = non_empty(&self.api_url).ok_or(ConfigError::Missing("api_url"))?;
        let model = non_empty(&self.model).ok_or(ConfigError::Missing("model"))?;
        Ok(ModelEndpoint {
            api_url: api_url.to_string(),
            model: model.to_string(),
        })
    }

    /// Search credential, if one is configured.
    pub fn search_api_key(&self) -> Option<&str> {
        non_empty(&self.search.api_key)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let settings = Self::default();
        toml::to_string_pretty(&settings).unwrap_or_default()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
            features: FeatureFlags::default(),
            search: SearchConfig::default(),
            tools: ToolsConfig::default(),
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

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}
