//! Plan-then-execute collaboration across specialists.
//!
//! Phase 1 runs one planning generation whose only tools are
//! `delegateToAgent` and `aggregateResults`. Every accepted `delegateToAgent`
//! call becomes a [`CollaborationTask`], in the order the model issued them.
//! Phase 2 runs those tasks one after another through the
//! [`AgentExecutor`] and composes a per-agent summary.

use super::executor::{AgentExecutor, AgentResult};
use super::status::{ActiveStatus, ActivityState};
use super::tools::{AggregateResultsTool, DelegateToAgentTool, DELEGATE_TOOL};
use crate::provider::ProviderError;
use crate::registry::ToolRegistry;
use crate::step_loop::{GenerateOutput, GenerateRequest};
use crate::tool::opt_str_arg;
use crate::types::Message;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_PLANNING_STEPS: usize = 5;

const ORCHESTRATOR: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("task {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// A delegated sub-task and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationTask {
    pub id: String,
    pub description: String,
    pub assigned_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AgentResult>,
}

impl CollaborationTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        assigned_agent: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assigned_agent: assigned_agent.into(),
            context,
            status: TaskStatus::Pending,
            result: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&AgentResult> {
        self.result.as_ref()
    }

    /// Advance the status. Only forward moves are allowed:
    /// pending → in-progress → completed | failed.
    pub fn advance(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        );
        if !allowed {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Record the executor's outcome and close the task.
    pub fn finish(&mut self, result: AgentResult) -> Result<(), TaskError> {
        let to = if result.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.advance(to)?;
        self.result = Some(result);
        Ok(())
    }
}

/// Everything a collaboration run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaborationReport {
    pub plan: Vec<CollaborationTask>,
    pub results: Vec<AgentResult>,
    pub summary: String,
}

/// A `delegateToAgent` call the planner made and the tool accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub agent_name: String,
    pub task: String,
    pub context: Option<String>,
}

/// Accepted delegations, in issue order. Calls to other tools and rejected
/// delegations are skipped.
pub fn extract_delegations(output: &GenerateOutput) -> Vec<Delegation> {
    output
        .tool_results
        .iter()
        .filter(|r| r.tool_name == DELEGATE_TOOL)
        .filter_map(|r| {
            if r.is_error {
                debug!("Skipping rejected delegation: {}", r.result);
                return None;
            }
            Some(Delegation {
                agent_name: opt_str_arg(&r.arguments, "agentName")?.to_string(),
                task: opt_str_arg(&r.arguments, "task")?.to_string(),
                context: opt_str_arg(&r.arguments, "context").map(str::to_string),
            })
        })
        .collect()
}

pub struct Orchestrator {
    executor: AgentExecutor,
    planning_steps: usize,
}

impl Orchestrator {
    pub fn new(executor: AgentExecutor) -> Self {
        Self {
            executor,
            planning_steps: DEFAULT_PLANNING_STEPS,
        }
    }

    pub fn with_planning_steps(mut self, steps: usize) -> Self {
        self.planning_steps = steps;
        self
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.executor
    }

    fn planning_prompt(&self) -> String {
        let mut prompt = String::from(
            "You coordinate a team of specialists. Break the user's request into \
             sub-tasks and hand each one to the best-suited specialist.\n\n\
             Specialists:\n",
        );
        for agent in self.executor.agents().list() {
            prompt.push_str(&format!(
                "- {} (`{}`): {}\n",
                agent.display_name, agent.name, agent.description
            ));
        }
        prompt.push_str(
            "\nCall `delegateToAgent` once per sub-task, in the order the work should \
             happen. Pass the specialist's name, a self-contained task description, and \
             any context it needs. When everything is delegated, call `aggregateResults` \
             with a one-paragraph plan summary.",
        );
        prompt
    }

    fn planning_tools(&self) -> ToolRegistry {
        ToolRegistry::new()
            .with(DelegateToAgentTool::new(self.executor.agents().clone()))
            .with(AggregateResultsTool)
    }

    /// Plan, then run every accepted delegation in order.
    ///
    /// Only the planning generation can fail; specialist failures are recorded
    /// on their task and in the summary.
    pub async fn run(
        &self,
        request: &str,
        external: &ToolRegistry,
    ) -> Result<CollaborationReport, ProviderError> {
        let status = self.executor.status();
        info!("Orchestration started");
        status.report(ActiveStatus::new(
            ORCHESTRATOR,
            ActivityState::Planning,
            Some(request),
        ));

        let tools = self.planning_tools();
        let planning = self
            .executor
            .model()
            .generate(GenerateRequest {
                system_prompt: self.planning_prompt(),
                messages: vec![Message::user(request)],
                tools: &tools,
                max_steps: self.planning_steps,
            })
            .await;
        let planning = match planning {
            Ok(output) => output,
            Err(e) => {
                warn!("Planning failed: {}", e);
                status.report(ActiveStatus::new(
                    ORCHESTRATOR,
                    ActivityState::Failed,
                    Some(request),
                ));
                return Err(e);
            }
        };

        let mut plan: Vec<CollaborationTask> = extract_delegations(&planning)
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                CollaborationTask::new(format!("task-{}", i + 1), d.task, d.agent_name, d.context)
            })
            .collect();
        info!("Plan has {} task(s)", plan.len());

        let mut results = Vec::with_capacity(plan.len());
        for task in plan.iter_mut() {
            if let Err(e) = task.advance(TaskStatus::InProgress) {
                warn!("{}", e);
                continue;
            }
            let result = self
                .executor
                .run(
                    &task.assigned_agent,
                    &task.description,
                    task.context.as_deref(),
                    external,
                )
                .await;
            if let Err(e) = task.finish(result.clone()) {
                warn!("{}", e);
            }
            results.push(result);
        }

        let summary = summarize(&self.executor, &results);
        status.report(ActiveStatus::new(
            ORCHESTRATOR,
            ActivityState::Completed,
            Some(request),
        ));
        info!("Orchestration finished with {} result(s)", results.len());

        Ok(CollaborationReport {
            plan,
            results,
            summary,
        })
    }
}

/// One `## <display name>` section per result, in execution order.
fn summarize(executor: &AgentExecutor, results: &[AgentResult]) -> String {
    results
        .iter()
        .map(|r| {
            let body = if r.success {
                r.result.clone()
            } else {
                format!("Error: {}", r.error.as_deref().unwrap_or("unknown error"))
            };
            format!("## {}\n{}", executor.agents().display_name(&r.agent_name), body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
