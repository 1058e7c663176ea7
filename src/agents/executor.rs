//! Runs one persona against one task.

use super::registry::{AgentPersona, AgentRegistry};
use super::status::{ActiveStatus, ActivityState, NoopStatus, StatusReporter};
use crate::chat::panic_message;
use crate::registry::ToolRegistry;
use crate::step_loop::{GenerateRequest, ModelClient};
use crate::types::Message;
use serde::Serialize;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Specialists are expected to converge quickly.
pub const DEFAULT_AGENT_STEPS: usize = 3;

/// One tool call a specialist made, with what the tool returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentToolCall {
    pub name: String,
    pub args: Value,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent_name: String,
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AgentToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    fn failure(agent_name: &str, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            success: false,
            result: String::new(),
            tool_calls: None,
            error: Some(error.into()),
        }
    }
}

/// The user message a specialist receives.
pub fn task_message(task: &str, context: Option<&str>) -> String {
    match context {
        Some(context) if !context.trim().is_empty() => {
            format!("{}\n\nContext:\n{}", task, context)
        }
        _ => task.to_string(),
    }
}

/// Executes specialists against the shared model and tool set.
///
/// Never fails: unknown personas and provider errors come back as an
/// [`AgentResult`] with `success: false`.
#[derive(Clone)]
pub struct AgentExecutor {
    model: ModelClient,
    agents: Arc<AgentRegistry>,
    shared_tools: ToolRegistry,
    max_steps: usize,
    status: Arc<dyn StatusReporter>,
}

impl AgentExecutor {
    pub fn new(model: ModelClient, agents: Arc<AgentRegistry>, shared_tools: ToolRegistry) -> Self {
        Self {
            model,
            agents,
            shared_tools,
            max_steps: DEFAULT_AGENT_STEPS,
            status: Arc::new(NoopStatus),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn model(&self) -> &ModelClient {
        &self.model
    }

    pub fn status(&self) -> &Arc<dyn StatusReporter> {
        &self.status
    }

    /// Persona tools with `external` merged on top.
    fn tools_for(&self, persona: &AgentPersona, external: &ToolRegistry) -> ToolRegistry {
        let own = match &persona.tools {
            Some(names) => self.shared_tools.subset(names.as_slice()),
            None => self.shared_tools.clone(),
        };
        own.merged(external)
    }

    pub async fn run(
        &self,
        agent_name: &str,
        task: &str,
        context: Option<&str>,
        external: &ToolRegistry,
    ) -> AgentResult {
        let Some(persona) = self.agents.get(agent_name) else {
            warn!("Agent '{}' not found", agent_name);
            return AgentResult::failure(
                agent_name,
                format!(
                    "agent not found: {} (available: {})",
                    agent_name,
                    self.agents.names().join(", ")
                ),
            );
        };

        info!("Running agent '{}'", agent_name);
        self.status.report(ActiveStatus::new(
            agent_name,
            ActivityState::Running,
            Some(task),
        ));

        let tools = self.tools_for(persona, external);
        let request = GenerateRequest {
            system_prompt: persona.system_prompt.clone(),
            messages: vec![Message::user(task_message(task, context))],
            tools: &tools,
            max_steps: self.max_steps,
        };

        let outcome = AssertUnwindSafe(self.model.generate(request))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(Ok(output)) => {
                let tool_calls: Vec<AgentToolCall> = output
                    .tool_calls
                    .iter()
                    .map(|call| AgentToolCall {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                        result: output
                            .result_for(&call.id)
                            .map(|r| r.result.clone())
                            .unwrap_or(Value::Null),
                    })
                    .collect();
                AgentResult {
                    agent_name: agent_name.to_string(),
                    success: true,
                    result: output.text,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!("Agent '{}' failed: {}", agent_name, e);
                AgentResult::failure(agent_name, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!("Agent '{}' panicked: {}", agent_name, message);
                AgentResult::failure(agent_name, format!("Internal error: {}", message))
            }
        };

        let state = if result.success {
            ActivityState::Completed
        } else {
            ActivityState::Failed
        };
        self.status
            .report(ActiveStatus::new(agent_name, state, Some(task)));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_goes_under_a_label() {
        assert_eq!(task_message("Fix it", None), "Fix it");
        assert_eq!(task_message("Fix it", Some("  ")), "Fix it");
        assert_eq!(
            task_message("Fix it", Some("main.rs")),
            "Fix it\n\nContext:\nmain.rs"
        );
    }

    #[test]
    fn failure_serializes_without_tool_calls() {
        let json = serde_json::to_value(AgentResult::failure("ghost", "agent not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "agentName": "ghost",
                "success": false,
                "result": "",
                "error": "agent not found"
            })
        );
    }
}
