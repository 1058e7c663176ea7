//! Adapts MCP tools to the AgentTool trait.

use super::hub::McpConnection;
use super::types::{McpContent, McpError, McpToolInfo};
use crate::registry::composed_name;
use crate::schema::Schema;
use crate::tool::{AgentTool, ToolError, ToolKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Exposes one remote tool as `<source>_<tool>`.
///
/// The remote JSON Schema is translated once, at construction, into the local
/// [`Schema`] used for argument validation. The model is shown the server's
/// schema as-is.
pub struct McpToolAdapter {
    connection: Arc<McpConnection>,
    remote_name: String,
    exposed_name: String,
    description: String,
    input_schema: Value,
    schema: Schema,
}

impl McpToolAdapter {
    pub fn new(connection: Arc<McpConnection>, tool: McpToolInfo) -> Self {
        Self {
            exposed_name: composed_name(connection.name(), &tool.name),
            description: tool
                .description
                .unwrap_or_else(|| format!("{} tool from {}", tool.name, connection.name())),
            schema: Schema::from_json_schema(&tool.input_schema),
            input_schema: if tool.input_schema.is_object() {
                tool.input_schema
            } else {
                json!({"type": "object", "properties": {}})
            },
            remote_name: tool.name,
            connection,
        }
    }

    /// Name the server knows this tool by.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

#[async_trait]
impl AgentTool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Schema {
        self.schema.clone()
    }

    fn json_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Remote {
            source: self.connection.name().to_string(),
        }
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let unavailable = |reason: String| ToolError::Unavailable {
            server: self.connection.name().to_string(),
            reason,
        };

        if !self.connection.is_connected() {
            return Err(unavailable("server disconnected".into()));
        }

        let result = self
            .connection
            .client()
            .call_tool(&self.remote_name, args)
            .await
            .map_err(|e| match e {
                McpError::Transport(_) | McpError::ConnectionClosed | McpError::Io(_) => {
                    unavailable(e.to_string())
                }
                other => ToolError::Failed(format!("MCP call failed: {}", other)),
            })?;

        if result.is_error {
            return Err(ToolError::Failed(result.text()));
        }

        let only_text = result
            .content
            .iter()
            .all(|c| matches!(c, McpContent::Text { .. }));
        let content = if only_text {
            Value::String(result.text())
        } else {
            serde_json::to_value(&result.content).unwrap_or(Value::Null)
        };
        Ok(json!({"success": true, "content": content}))
    }
}
