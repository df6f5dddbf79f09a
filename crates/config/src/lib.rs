//! Configuration management for claw
//!
//! Loads and saves the JSON document at `~/.claw/config.json` and applies
//! `CLAW_*` environment overrides on top of it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub mod paths;

pub use paths::{config_path, data_dir, resolve_root};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no API key configured; run `claw init` or set CLAW_API_KEY")]
    MissingApiKey,

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// When the agent commits on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Never commit automatically
    Off,
    /// Commit once when a task that changed files finishes
    PerTask,
    /// Commit after every tool batch that changed files
    PerMutation,
}

/// Language model backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            context_window: default_context_window(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.3
}

fn default_context_window() -> u32 {
    65536
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

/// Telegram bot settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Numeric user ids or usernames; empty allows everyone
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

/// Project the agent operates on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_policy: Option<CommitPolicy>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            auto_commit: default_auto_commit(),
            commit_policy: None,
            max_iterations: default_max_iterations(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl ProjectConfig {
    /// An explicit `commit_policy` wins over the `auto_commit` flag
    pub fn effective_commit_policy(&self) -> CommitPolicy {
        match self.commit_policy {
            Some(policy) => policy,
            None if self.auto_commit => CommitPolicy::PerTask,
            None => CommitPolicy::Off,
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_auto_commit() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    40
}

fn default_command_timeout() -> u64 {
    60
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub project: ProjectConfig,
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub async fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path()).await?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("reading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        self.save_to(&config_path()).await
    }

    /// Save to a specific file, creating parent directories
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `CLAW_*` overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = non_empty("CLAW_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(key) = non_empty("CLAW_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(base) = non_empty("CLAW_API_BASE") {
            self.llm.api_base = Some(base);
        }
        if let Some(model) = non_empty("CLAW_MODEL") {
            self.llm.model = model;
        }
        if let Some(token) = non_empty("CLAW_TG_TOKEN") {
            self.telegram.token = token;
            self.telegram.enabled = true;
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }

    /// Check the values the agent cannot run without
    pub fn validate(&self) -> Result<()> {
        if !self.has_api_key() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "llm.model",
                reason: "must not be empty".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid {
                field: "llm.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "llm.max_tokens",
                reason: "must be positive".to_string(),
            });
        }
        if self.project.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "project.max_iterations",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Project root resolved against the current directory
    pub fn project_root(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        resolve_root(&self.project.root, &cwd)
    }
}

/// Model suggested by `claw init` for a provider id
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o",
        "openrouter" => "anthropic/claude-sonnet-4",
        "anthropic" => "claude-sonnet-4-20250514",
        "glm" => "glm-4-plus",
        "minimax" => "MiniMax-Text-01",
        "moonshot" => "moonshot-v1-8k",
        "dashscope" => "qwen-max",
        "doubao" => "doubao-pro-256k",
        "spark" => "generalv3.5",
        "baichuan" => "Baichuan4",
        "yi" => "yi-large",
        "stepfun" => "step-2-16k",
        _ => "deepseek-chat",
    }
}
