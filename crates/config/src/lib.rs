//! Configuration loading, validation, and management for m1nd.
//!
//! Loads configuration from `~/.m1nd/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Built-in system prompt used when no prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer briefly and to the point.";

/// The root configuration structure.
///
/// Maps directly to `~/.m1nd/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inline system prompt (takes precedence over `prompt_file`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Path to a text file holding the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,

    /// Ordered provider ids tried for every question
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<String>,

    /// Declared provider adapters
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

fn default_provider_priority() -> Vec<String> {
    vec!["groq".into()]
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        id: "groq".into(),
        kind: ProviderKind::ChatCompletions,
        api_url: "https://api.groq.com/openai/v1".into(),
        model: "llama-3.3-70b-versatile".into(),
        api_key: None,
        timeout_secs: default_timeout_secs(),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
        supports_tools: true,
    }]
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("prompt_file", &self.prompt_file)
            .field("provider_priority", &self.provider_priority)
            .field("providers", &self.providers)
            .field("retry", &self.retry)
            .field("conversation", &self.conversation)
            .field("tools", &self.tools)
            .field("delivery", &self.delivery)
            .field("telegram", &self.telegram)
            .finish()
    }
}

/// Wire dialect spoken by a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Stateless `/chat/completions` (Groq, OpenAI, OpenRouter, Ollama)
    ChatCompletions,
    /// Stateful `/responses` with `previous_response_id` continuation
    Responses,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,

    pub kind: ProviderKind,

    pub api_url: String,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-call ceiling, 30..=60 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_true")]
    pub supports_tools: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("supports_tools", &self.supports_tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_base_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

fn default_max_history() -> usize {
    10
}
fn default_max_tool_iterations() -> usize {
    5
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub web_search: bool,

    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_timeout_secs() -> u64 {
    10
}
fn default_max_results() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search: true,
            search_timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_part_length")]
    pub max_part_length: usize,

    /// Characters kept free for the `(i/total)` numbering prefix
    #[serde(default = "default_prefix_reserve")]
    pub prefix_reserve: usize,

    #[serde(default = "default_part_delay_ms")]
    pub part_delay_ms: u64,
}

fn default_max_part_length() -> usize {
    4096
}
fn default_prefix_reserve() -> usize {
    30
}
fn default_part_delay_ms() -> u64 {
    150
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_part_length: default_max_part_length(),
            prefix_reserve: default_prefix_reserve(),
            part_delay_ms: default_part_delay_ms(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    /// Allowlist of sender IDs. Empty = deny all. ["*"] = allow all.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Usernames granted admin commands at startup
    #[serde(default)]
    pub admins: Vec<String>,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout_secs() -> u64 {
    30
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("admins", &self.admins)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.m1nd/config.toml).
    ///
    /// Environment overrides:
    /// - `M1ND_API_KEY` fills every provider without a key
    /// - `GROQ_API_KEY` / `OPENAI_API_KEY` / `OPENROUTER_API_KEY` fill the provider with that id
    /// - `TELEGRAM_BOT_TOKEN` fills the bot token
    /// - `M1ND_PROVIDERS` (comma-separated) replaces `provider_priority`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::default_path())
    }

    /// Load `path` and apply the environment overrides listed on [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `~/.m1nd/config.toml`
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        for provider in &mut self.providers {
            if provider.api_key.is_some() {
                continue;
            }
            let vendor_var = format!("{}_API_KEY", provider.id.to_uppercase().replace('-', "_"));
            provider.api_key = var(&vendor_var).or_else(|| var("M1ND_API_KEY"));
        }

        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            let telegram = self.telegram.get_or_insert_with(|| TelegramConfig {
                bot_token: String::new(),
                allowed_users: default_allowed_users(),
                admins: Vec::new(),
                poll_timeout_secs: default_poll_timeout_secs(),
            });
            if telegram.bot_token.is_empty() {
                telegram.bot_token = token;
            }
        }

        if let Some(priority) = var("M1ND_PROVIDERS") {
            let ids: Vec<String> = priority
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !ids.is_empty() {
                self.provider_priority = ids;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".m1nd")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in &self.providers {
            if !(30..=60).contains(&provider.timeout_secs) {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': timeout_secs must be between 30 and 60",
                    provider.id
                )));
            }
            if provider.temperature < 0.0 || provider.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': temperature must be between 0.0 and 2.0",
                    provider.id
                )));
            }
        }

        if !self.providers.is_empty() {
            if self.provider_priority.is_empty() {
                return Err(ConfigError::ValidationError(
                    "provider_priority must list at least one provider".into(),
                ));
            }
            if let Some(unknown) = self
                .provider_priority
                .iter()
                .find(|id| self.provider(id).is_none())
            {
                return Err(ConfigError::ValidationError(format!(
                    "provider_priority references undeclared provider '{unknown}'"
                )));
            }
        }

        if self.conversation.max_history < 2 {
            return Err(ConfigError::ValidationError(
                "conversation.max_history must be at least 2".into(),
            ));
        }

        if self.conversation.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_tool_iterations must be at least 1".into(),
            ));
        }

        // The numbering prefix "(i/total)\n\n" must always fit.
        if self.delivery.max_part_length <= self.delivery.prefix_reserve
            || self.delivery.prefix_reserve < 8
        {
            return Err(ConfigError::ValidationError(
                "delivery.prefix_reserve must be at least 8 and below max_part_length".into(),
            ));
        }

        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Resolve the system prompt: inline text, then `prompt_file`, then the built-in default.
    pub fn resolve_system_prompt(&self) -> String {
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            return prompt.to_string();
        }

        if let Some(path) = &self.prompt_file {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => tracing::warn!("Prompt file {} is empty, using default", path.display()),
                Err(e) => tracing::warn!(
                    "Failed to read prompt file {}: {e}, using default",
                    path.display()
                ),
            }
        }

        DEFAULT_SYSTEM_PROMPT.to_string()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            prompt_file: None,
            provider_priority: default_provider_priority(),
            providers: default_providers(),
            retry: RetryConfig::default(),
            conversation: ConversationConfig::default(),
            tools: ToolsConfig::default(),
            delivery: DeliveryConfig::default(),
            telegram: None,
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
