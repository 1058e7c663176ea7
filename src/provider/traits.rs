use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for one model completion (one step).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Tool definition sent to the LLM (schema only, no execute fn)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The core provider trait. Implement this for each LLM backend.
///
/// One call produces one assistant message: text plus zero or more tool
/// calls. Running the requested tools and looping is the caller's job
/// (see [`crate::step_loop::ModelClient`]).
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn stream(&self, config: StreamConfig) -> Result<Message, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}
