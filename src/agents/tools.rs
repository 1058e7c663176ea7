//! Delegation tools.
//!
//! The chat model gets `listAgents`, `callAgent` and `collaborativeTask`.
//! The planning pass gets `delegateToAgent` and `aggregateResults`.
//! Specialists get none of them, so delegation never recurses.

use super::executor::AgentExecutor;
use super::orchestrator::Orchestrator;
use super::registry::AgentRegistry;
use crate::registry::ToolRegistry;
use crate::schema::Schema;
use crate::tool::{opt_str_arg, str_arg, AgentTool, ToolError, ToolKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const DELEGATE_TOOL: &str = "delegateToAgent";
pub const AGGREGATE_TOOL: &str = "aggregateResults";

fn unknown_agent(agents: &AgentRegistry, name: &str) -> ToolError {
    ToolError::NotFound {
        kind: "agent",
        name: name.to_string(),
        available: agents.names(),
    }
}

fn to_payload(value: impl serde::Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Failed(e.to_string()))
}

/// `listAgents`: name, display name and description of every specialist.
pub struct ListAgentsTool {
    agents: Arc<AgentRegistry>,
}

impl ListAgentsTool {
    pub fn new(agents: Arc<AgentRegistry>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentTool for ListAgentsTool {
    fn name(&self) -> &str {
        "listAgents"
    }

    fn description(&self) -> &str {
        "List the specialist agents that callAgent can delegate to."
    }

    fn parameters(&self) -> Schema {
        Schema::object()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Delegation
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!({"success": true, "agents": self.agents.summaries()}))
    }
}

/// `callAgent { agentName, task, context? }`: run one specialist.
pub struct CallAgentTool {
    executor: AgentExecutor,
}

impl CallAgentTool {
    pub fn new(executor: AgentExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl AgentTool for CallAgentTool {
    fn name(&self) -> &str {
        "callAgent"
    }

    fn description(&self) -> &str {
        "Hand a task to one specialist agent and return its answer. \
         Use listAgents to see who is available."
    }

    fn parameters(&self) -> Schema {
        Schema::object()
            .required("agentName", Schema::String, "Specialist name")
            .required("task", Schema::String, "What the specialist should do")
            .optional("context", Schema::String, "Background the specialist needs")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Delegation
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let agent_name = str_arg(&args, "agentName")?;
        let task = str_arg(&args, "task")?;
        if !self.executor.agents().contains(agent_name) {
            return Err(unknown_agent(self.executor.agents(), agent_name));
        }

        let result = self
            .executor
            .run(
                agent_name,
                task,
                opt_str_arg(&args, "context"),
                &ToolRegistry::new(),
            )
            .await;
        if !result.success {
            return Err(ToolError::Failed(
                result
                    .error
                    .unwrap_or_else(|| format!("{} failed", agent_name)),
            ));
        }
        to_payload(result)
    }
}

/// `collaborativeTask { task }`: plan across specialists and run the plan.
pub struct CollaborativeTaskTool {
    orchestrator: Arc<Orchestrator>,
}

impl CollaborativeTaskTool {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl AgentTool for CollaborativeTaskTool {
    fn name(&self) -> &str {
        "collaborativeTask"
    }

    fn description(&self) -> &str {
        "Split a larger task across several specialist agents, run them in order \
         and return every result plus a combined summary."
    }

    fn parameters(&self) -> Schema {
        Schema::object().required("task", Schema::String, "The overall task")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Delegation
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let task = str_arg(&args, "task")?;
        let report = self
            .orchestrator
            .run(task, &ToolRegistry::new())
            .await
            .map_err(|e| ToolError::Failed(format!("Planning failed: {}", e)))?;
        let mut payload = to_payload(report)?;
        payload["success"] = Value::Bool(true);
        Ok(payload)
    }
}

/// Planning-only: record one delegation. Unknown personas are rejected here,
/// before anything runs.
pub struct DelegateToAgentTool {
    agents: Arc<AgentRegistry>,
}

impl DelegateToAgentTool {
    pub fn new(agents: Arc<AgentRegistry>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentTool for DelegateToAgentTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL
    }

    fn description(&self) -> &str {
        "Assign one sub-task to a specialist. Call once per sub-task, in execution order."
    }

    fn parameters(&self) -> Schema {
        Schema::object()
            .required("agentName", Schema::String, "Specialist name")
            .required("task", Schema::String, "Self-contained sub-task")
            .optional("context", Schema::String, "Background the specialist needs")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Delegation
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let agent_name = str_arg(&args, "agentName")?;
        let task = str_arg(&args, "task")?;
        if task.trim().is_empty() {
            return Err(ToolError::InvalidArgs("'task' must not be empty".into()));
        }
        if !self.agents.contains(agent_name) {
            return Err(unknown_agent(&self.agents, agent_name));
        }
        Ok(json!({"success": true, "delegated": agent_name, "task": task}))
    }
}

/// Planning-only: lets the planner state its summary. Acknowledges only.
pub struct AggregateResultsTool;

#[async_trait]
impl AgentTool for AggregateResultsTool {
    fn name(&self) -> &str {
        AGGREGATE_TOOL
    }

    fn description(&self) -> &str {
        "Finish planning with a short summary of how the sub-tasks fit together."
    }

    fn parameters(&self) -> Schema {
        Schema::object().required("summary", Schema::String, "Plan summary")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Delegation
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!({"success": true, "acknowledged": true}))
    }
}

/// The three chat-facing delegation tools.
pub fn agent_tools(orchestrator: Arc<Orchestrator>) -> Vec<Arc<dyn AgentTool>> {
    let executor = orchestrator.executor().clone();
    vec![
        Arc::new(ListAgentsTool::new(executor.agents().clone())),
        Arc::new(CallAgentTool::new(executor)),
        Arc::new(CollaborativeTaskTool::new(orchestrator)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planning_registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(DelegateToAgentTool::new(Arc::new(AgentRegistry::builtin())))
            .with(AggregateResultsTool)
    }

    #[tokio::test]
    async fn delegation_to_unknown_persona_is_rejected() {
        let (payload, is_error) = planning_registry()
            .invoke(DELEGATE_TOOL, json!({"agentName": "wizard", "task": "cast"}))
            .await;
        assert!(is_error);
        assert_eq!(payload["error"], "agent not found: wizard");
        assert!(payload["available"]
            .as_array()
            .unwrap()
            .contains(&json!("coder")));
    }

    #[tokio::test]
    async fn delegation_requires_a_task() {
        let (payload, is_error) = planning_registry()
            .invoke(DELEGATE_TOOL, json!({"agentName": "coder"}))
            .await;
        assert!(is_error);
        assert!(payload["error"].as_str().unwrap().contains("task"));

        let (_, is_error) = planning_registry()
            .invoke(DELEGATE_TOOL, json!({"agentName": "coder", "task": "  "}))
            .await;
        assert!(is_error);
    }

    #[tokio::test]
    async fn accepted_delegation_and_aggregate() {
        let registry = planning_registry();
        let (payload, is_error) = registry
            .invoke(DELEGATE_TOOL, json!({"agentName": "coder", "task": "write it"}))
            .await;
        assert!(!is_error);
        assert_eq!(payload["delegated"], "coder");

        let (payload, is_error) = registry
            .invoke(AGGREGATE_TOOL, json!({"summary": "one step"}))
            .await;
        assert!(!is_error);
        assert_eq!(payload["acknowledged"], true);
    }
}
