//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.claudette/config.json`). Every field has a
//! default, so a missing file or `{}` gives a working setup once an API key is stored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agent::{
    AgentSettings, DEFAULT_MAX_TOKENS, DEFAULT_MAX_TOOL_ITERATIONS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
};
use crate::llm::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};

/// Env var that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CLAUDETTE_CONFIG_PATH";

/// Top-level application config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Messages API endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Model parameters and the tool loop.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Where conversations are persisted.
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `anthropic-version` header.
    #[serde(default = "default_api_version")]
    pub version: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            version: default_api_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Optional system prompt sent with every request. Blank means none.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Model requests allowed per message before the send is stopped.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Directory the file and shell tools work in (default ~/.claudette/workspace).
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tool_iterations() -> usize {
    DEFAULT_MAX_TOOL_ITERATIONS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
            max_tool_iterations: default_max_tool_iterations(),
            workspace: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Data directory. Relative paths are resolved against the config file's parent.
    /// Omit to use `data` next to the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".claudette").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from `path`, the default path, or CLAUDETTE_CONFIG_PATH. Missing file => default
/// config. Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Directory holding the config file (also home of the credentials file).
pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Resolve the conversation data directory: `storage.directory` if set (relative paths against
/// the config directory), otherwise `data` next to the config file.
pub fn resolve_storage_dir(config: &Config, config_path: &Path) -> PathBuf {
    let base = config_dir(config_path);
    match &config.storage.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                base.join(d)
            }
        }
        _ => base.join("data"),
    }
}

/// Resolve the tool workspace: `agent.workspace` if set, otherwise `workspace` next to the
/// config file.
pub fn resolve_workspace_dir(config: &Config, config_path: &Path) -> PathBuf {
    match &config.agent.workspace {
        Some(d) if !d.as_os_str().is_empty() => d.clone(),
        _ => config_dir(config_path).join("workspace"),
    }
}

/// Agent settings from config, with an optional model override (e.g. a `--model` flag).
pub fn agent_settings(config: &Config, model_override: Option<&str>) -> AgentSettings {
    let model = model_override
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| config.agent.model.trim());
    let model = if model.is_empty() {
        log::warn!("config: agent.model is empty, using {}", DEFAULT_MODEL);
        DEFAULT_MODEL
    } else {
        model
    };
    AgentSettings {
        model: model.to_string(),
        max_tokens: config.agent.max_tokens,
        temperature: config.agent.temperature,
        system_prompt: config
            .agent
            .system_prompt
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        max_tool_iterations: config.agent.max_tool_iterations.max(1),
    }
}
