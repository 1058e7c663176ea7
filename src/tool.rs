//! The contract every callable tool satisfies.
//!
//! Tools return `Result<Value, ToolError>` from [`AgentTool::execute`]. Callers
//! never see that `Result` directly: [`crate::ToolRegistry::invoke`] turns any
//! error into a [`failure payload`](ToolError::to_payload), so one broken tool
//! only degrades itself and the surrounding loop keeps going.

use crate::schema::{Schema, SchemaError};
use serde_json::{json, Value};
use std::fmt;

/// Which family a tool belongs to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToolKind {
    /// Proxied to a remote tool server.
    Remote { source: String },
    /// Reads from the skill catalog.
    Skill,
    /// Hands work to a specialist persona or the orchestrator.
    Delegation,
    /// Implemented in-process by the embedding application.
    Local,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { source } => write!(f, "remote:{}", source),
            Self::Skill => write!(f, "skill"),
            Self::Delegation => write!(f, "delegation"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// A tool the model can call. Implement this trait for your tools.
#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    /// Unique tool name within a registry
    fn name(&self) -> &str;
    /// Description for the model
    fn description(&self) -> &str;
    /// Accepted arguments. Checked before `execute` runs.
    fn parameters(&self) -> Schema;
    /// JSON Schema shown to the model. Defaults to rendering [`Self::parameters`].
    fn json_schema(&self) -> Value {
        self.parameters().to_json_schema()
    }
    fn kind(&self) -> ToolKind {
        ToolKind::Local
    }
    /// Run the tool with arguments that already passed validation.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{kind} not found: {name}")]
    NotFound {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },
    #[error("{server} is unavailable: {reason}")]
    Unavailable { server: String, reason: String },
}

impl From<SchemaError> for ToolError {
    fn from(e: SchemaError) -> Self {
        ToolError::InvalidArgs(e.to_string())
    }
}

impl ToolError {
    /// A human-readable suggestion shown next to the error.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotFound { kind, .. } => Some(format!(
                "Use one of the available {} names listed in `available`.",
                kind
            )),
            Self::InvalidArgs(_) => {
                Some("Check the tool's parameter schema and call it again.".into())
            }
            Self::Unavailable { server, .. } => Some(format!(
                "The '{}' tool server is not reachable; continue without it.",
                server
            )),
            Self::Failed(_) => None,
        }
    }

    /// Structured `{success: false, error, hint?, available?}` payload.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "success": false,
            "error": self.to_string(),
        });
        if let Some(hint) = self.hint() {
            payload["hint"] = Value::String(hint);
        }
        if let Self::NotFound { available, .. } = self {
            payload["available"] = json!(available);
        }
        payload
    }
}

/// Pull a required string argument out of validated args.
pub fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing '{}' parameter", key)))
}

/// Pull an optional, non-empty string argument.
pub fn opt_str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_payload_lists_alternatives() {
        let err = ToolError::NotFound {
            kind: "skill",
            name: "weather".into(),
            available: vec!["git".into(), "docker".into()],
        };
        let payload = err.to_payload();
        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "skill not found: weather");
        assert_eq!(payload["available"], json!(["git", "docker"]));
        assert!(payload["hint"].as_str().unwrap().contains("skill"));
    }

    #[test]
    fn failed_payload_has_no_hint() {
        let payload = ToolError::Failed("boom".into()).to_payload();
        assert_eq!(payload, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn schema_errors_become_invalid_args() {
        let err: ToolError = SchemaError::MissingField {
            path: "$".into(),
            field: "task".into(),
        }
        .into();
        assert!(matches!(err, ToolError::InvalidArgs(ref m) if m.contains("task")));
    }
}
