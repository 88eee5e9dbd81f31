//! Configuration loading and validation.
//!
//! Deployments describe the generator endpoint, session storage, and server
//! binding in a single YAML file. API keys are normally resolved indirectly
//! through `api_key_env` so config files can be committed without secrets.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedraftConfig {
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint. Defaults to api.openai.com.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Literal API key. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Bound on one generation call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many trailing conversation messages are sent per turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Override for the proposal-protocol system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for per-session JSON records.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_history_window() -> usize {
    40
}

fn default_storage_path() -> String {
    "sessions".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn from_file(path: &str) -> Result<RedraftConfig, EngineError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            EngineError::ConfigError(format!("failed to read config {}: {}", path, e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<RedraftConfig, EngineError> {
        let config: RedraftConfig = serde_yaml::from_str(contents)
            .map_err(|e| EngineError::ConfigError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl RedraftConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.generator.model.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "generator.model must not be empty".to_string(),
            ));
        }
        if self.generator.timeout_secs == 0 {
            return Err(EngineError::ConfigError(
                "generator.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.generator.history_window == 0 {
            return Err(EngineError::ConfigError(
                "generator.history_window must be greater than zero".to_string(),
            ));
        }
        if let Some(ref base) = self.generator.api_base {
            if base.trim().is_empty() {
                return Err(EngineError::ConfigError(
                    "generator.api_base must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}
