use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use crate::error::{Result, HonyakuError};

// Default values for optional sections
fn default_min_tokens() -> u32 {
    30
}

fn default_max_auto_tokens() -> u32 {
    500
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_reload_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    1
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend ids in the order they are attempted; ids may repeat
    pub api_priority: Vec<String>,
    /// Extra instructions appended after the persona block
    #[serde(default, alias = "promptUserAddendum", alias = "prompt_user_addendum")]
    pub prompt_user: String,
    /// Replaces the built-in persona block when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_persona: Option<String>,
    /// Path of the JSON term dictionary; empty disables dictionary hints
    #[serde(default, alias = "dict_path")]
    pub dictionary_path: String,
    pub model_params: ModelParams,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Configured backends keyed by the id used in `api_priority`
    #[serde(alias = "api_keys")]
    pub backends: BTreeMap<String, BackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Fixed completion budget; 0 derives it from the text length
    pub max_tokens: u32,
    /// Tokens granted per input character when `max_tokens` is 0
    pub token_limit_ratio: f64,
    /// Lower bound of the derived budget
    #[serde(default = "default_min_tokens")]
    pub min_tokens: u32,
    /// Upper bound of the derived budget
    #[serde(default = "default_max_auto_tokens")]
    pub max_auto_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// OpenAI-compatible base URL, e.g. https://api.deepseek.com/v1
    #[serde(alias = "base_url")]
    pub endpoint: String,
    /// Bearer credential
    pub api_key: String,
    /// Model identifier sent with every request
    #[serde(alias = "model_type")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address of the HTTP facade
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Wall-clock limit of a single translate call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Polling interval of the config and dictionary watchers
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Generic failures tolerated per call, counting the final one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause after a block or a transient failure; also the rate-limit base
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    /// Rate-limit retries tolerated per call
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            timeout_secs: default_timeout_secs(),
            reload_interval_secs: default_reload_interval_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs.max(1))
    }
}

impl ModelParams {
    /// Completion token budget for a cleaned text of `text_chars` characters.
    pub fn token_budget(&self, text_chars: usize) -> u32 {
        if self.max_tokens > 0 {
            return self.max_tokens;
        }
        let scaled = (text_chars as f64 * self.token_limit_ratio).floor();
        let scaled = if scaled.is_finite() && scaled > 0.0 {
            scaled.min(u32::MAX as f64) as u32
        } else {
            0
        };
        scaled.max(self.min_tokens).min(self.max_auto_tokens)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "deepseek".to_string(),
            BackendConfig {
                endpoint: "https://api.deepseek.com/v1".to_string(),
                api_key: "sk-XXXXXXXXXXXXXXXXXXXXXXXX".to_string(),
                model: "deepseek-chat".to_string(),
            },
        );

        Self {
            api_priority: vec!["deepseek".to_string()],
            prompt_user: String::new(),
            prompt_persona: None,
            dictionary_path: "./dictionary.json".to_string(),
            model_params: ModelParams {
                temperature: 0.1,
                top_p: 0.3,
                max_tokens: 0,
                token_limit_ratio: 2.0,
                min_tokens: default_min_tokens(),
                max_auto_tokens: default_max_auto_tokens(),
            },
            server: ServerConfig::default(),
            retry: RetryConfig::default(),
            backends,
        }
    }
}

impl Config {
    /// Load a config file; `.json` files are parsed as JSON, everything else as TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HonyakuError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Config = if is_json(path) {
            serde_json::from_str(&content)
                .map_err(|e| HonyakuError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            toml::from_str(&content)
                .map_err(|e| HonyakuError::Config(format!("Failed to parse config file: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| HonyakuError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| HonyakuError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| HonyakuError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.api_priority.is_empty() {
            return Err(HonyakuError::Config("api_priority must list at least one backend".to_string()));
        }
        if self.model_params.min_tokens > self.model_params.max_auto_tokens {
            return Err(HonyakuError::Config(format!(
                "model_params.min_tokens ({}) exceeds max_auto_tokens ({})",
                self.model_params.min_tokens, self.model_params.max_auto_tokens
            )));
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
