//! `ToolRegistry`: the merged name-to-tool mapping handed to the model.

use crate::provider::ToolDefinition;
use crate::tool::{AgentTool, ToolError, ToolKind};
use crate::types::{ToolCall, ToolCallResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Compose the externally exposed name of a tool served by `source`.
pub fn composed_name(source: &str, tool: &str) -> String {
    format!("{}_{}", source, tool)
}

/// Listing entry for a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: ToolKind,
}

/// Ordered collection of tools, unique by name.
///
/// Registration order is preserved. Registering a name that already exists
/// replaces the earlier tool in place (last applied wins).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`, replacing any tool of the same name. Returns the replaced tool.
    ///
    /// Composed names can collide across sources (`a_b` + `c` and `a` + `b_c`);
    /// that case is logged as a warning.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Option<Arc<dyn AgentTool>> {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => {
                match (self.tools[i].kind(), tool.kind()) {
                    (ToolKind::Remote { source: old }, ToolKind::Remote { source: new })
                        if old != new =>
                    {
                        warn!(
                            "Tool '{}' from '{}' replaces the one from '{}'",
                            tool.name(),
                            new,
                            old
                        );
                    }
                    _ => debug!("Replacing tool '{}'", tool.name()),
                }
                Some(std::mem::replace(&mut self.tools[i], tool))
            }
            None => {
                self.tools.push(tool);
                None
            }
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, tool: impl AgentTool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Register every tool in order; later names win.
    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn AgentTool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Merge `other` on top of `self`. Tools in `other` win on name conflict.
    pub fn merged(&self, other: &ToolRegistry) -> ToolRegistry {
        let mut out = self.clone();
        out.extend(other.tools.iter().cloned());
        out
    }

    /// Registry holding only the named tools that exist here, in `names` order.
    pub fn subset(&self, names: &[impl AsRef<str>]) -> ToolRegistry {
        let mut out = ToolRegistry::new();
        for name in names {
            match self.get(name.as_ref()) {
                Some(tool) => {
                    out.register(tool);
                }
                None => warn!("Tool '{}' requested but not registered", name.as_ref()),
            }
        }
        out
    }

    /// Look up a tool by its exposed name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Whether a tool with this exposed name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Exposed names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Name, description and family of every tool, in registration order.
    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                kind: t.kind(),
            })
            .collect()
    }

    /// Schemas sent to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.json_schema(),
            })
            .collect()
    }

    /// Run a tool by name. Never fails: unknown tools, invalid arguments and
    /// tool errors all come back as a `{success: false, ...}` payload with
    /// `is_error` set. Arguments are validated before the tool runs.
    pub async fn invoke(&self, name: &str, args: Value) -> (Value, bool) {
        let Some(tool) = self.get(name) else {
            let err = ToolError::NotFound {
                kind: "tool",
                name: name.to_string(),
                available: self.names(),
            };
            warn!("{}", err);
            return (err.to_payload(), true);
        };

        if let Value::String(raw) = &args {
            let err = ToolError::InvalidArgs(format!(
                "arguments must be a JSON object, got unparsed text: {}",
                raw
            ));
            warn!("Rejected call to '{}': {}", name, err);
            return (err.to_payload(), true);
        }

        if let Err(e) = tool.parameters().validate(&args) {
            let err = ToolError::from(e);
            warn!("Rejected call to '{}': {}", name, err);
            return (err.to_payload(), true);
        }

        match tool.execute(args).await {
            Ok(value) => (value, false),
            Err(err) => {
                warn!("Tool '{}' failed: {}", name, err);
                (err.to_payload(), true)
            }
        }
    }

    /// Execute one model-requested call and package the outcome.
    pub async fn run_call(&self, call: &ToolCall) -> ToolCallResult {
        let (result, is_error) = self.invoke(&call.name, call.arguments.clone()).await;
        ToolCallResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            is_error,
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    struct Echo(&'static str, &'static str);

    #[async_trait::async_trait]
    impl AgentTool for Echo {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        fn parameters(&self) -> Schema {
            Schema::object().required("text", Schema::String, "")
        }
        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            Ok(json!({"echo": args["text"], "by": self.1}))
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl AgentTool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Schema {
            Schema::Unconstrained
        }
        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Err(ToolError::Failed("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn invoke_validates_before_running() {
        let registry = ToolRegistry::new().with(Echo("echo", "first"));
        let (payload, is_error) = registry.invoke("echo", json!({})).await;
        assert!(is_error);
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("text"));

        let (payload, is_error) = registry.invoke("echo", json!({"text": "hi"})).await;
        assert!(!is_error);
        assert_eq!(payload["echo"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_names() {
        let registry = ToolRegistry::new().with(Echo("echo", "first"));
        let (payload, is_error) = registry.invoke("nope", json!({})).await;
        assert!(is_error);
        assert_eq!(payload["available"], json!(["echo"]));
    }

    #[tokio::test]
    async fn tool_errors_become_payloads() {
        let registry = ToolRegistry::new().with(Broken);
        let (payload, is_error) = registry.invoke("broken", json!(null)).await;
        assert!(is_error);
        assert_eq!(payload["error"], "disk on fire");
    }

    #[tokio::test]
    async fn merge_is_last_applied_wins() {
        let base = ToolRegistry::new()
            .with(Echo("echo", "base"))
            .with(Echo("other", "base"));
        let external = ToolRegistry::new().with(Echo("echo", "external"));
        let merged = base.merged(&external);

        assert_eq!(merged.names(), vec!["echo", "other"]);
        let (payload, _) = merged.invoke("echo", json!({"text": "x"})).await;
        assert_eq!(payload["by"], "external");
    }

    #[test]
    fn subset_keeps_requested_order() {
        let registry = ToolRegistry::new()
            .with(Echo("a", ""))
            .with(Echo("b", ""))
            .with(Echo("c", ""));
        let subset = registry.subset(&["c", "a", "missing"]);
        assert_eq!(subset.names(), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn string_arguments_are_rejected_before_running() {
        let registry = ToolRegistry::new().with(Broken);
        let (payload, is_error) = registry.invoke("broken", json!("{\"x\": ")).await;
        assert!(is_error);
        let error = payload["error"].as_str().unwrap();
        assert!(error.starts_with("Invalid arguments"));
        assert!(error.contains("{\"x\": "));
        assert!(payload["hint"].is_string());
    }

    #[test]
    fn composed_names_join_with_underscore() {
        assert_eq!(composed_name("fs", "read"), "fs_read");
    }
}
