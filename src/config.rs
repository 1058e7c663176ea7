//! Broker configuration, loaded from JSON.

use crate::mcp::McpServerConfig;
use crate::retry::RetryConfig;
use crate::skills::SkillSource;
use crate::step_loop::ModelSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which model to talk to and how.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: String::new(),
            max_tokens: None,
            temperature: None,
        }
    }
}

impl ModelConfig {
    pub fn settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Step ceilings for each loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepLimits {
    pub chat_steps: usize,
    pub agent_steps: usize,
    pub planning_steps: usize,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            chat_steps: crate::chat::DEFAULT_CHAT_STEPS,
            agent_steps: crate::agents::DEFAULT_AGENT_STEPS,
            planning_steps: crate::agents::DEFAULT_PLANNING_STEPS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub model: ModelConfig,
    pub mcp_servers: Vec<McpServerConfig>,
    pub skill_dirs: Vec<SkillSource>,
    pub limits: StepLimits,
    pub retry: RetryConfig,
    /// Replaces the built-in chat system prompt.
    pub system_prompt: Option<String>,
}

impl BrokerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.chat_steps == 0 || limits.agent_steps == 0 || limits.planning_steps == 0 {
            return Err(ConfigError::Invalid("step limits must be at least 1".into()));
        }
        let mut names: Vec<&str> = self.mcp_servers.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!(
                "duplicate MCP server name '{}'",
                w[0]
            )));
        }
        Ok(())
    }
}
