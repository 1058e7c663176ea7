//! Specialist personas, the single-agent executor, and the orchestrator that
//! plans work across them.

pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod status;
pub mod tools;

pub use executor::{AgentExecutor, AgentResult, AgentToolCall, DEFAULT_AGENT_STEPS};
pub use orchestrator::{
    CollaborationReport, CollaborationTask, Delegation, Orchestrator, TaskError, TaskStatus,
    DEFAULT_PLANNING_STEPS,
};
pub use registry::{AgentPersona, AgentRegistry, AgentSummary};
pub use status::{
    ActiveStatus, ActivityState, NoopStatus, RecordingStatus, StatusBoard, StatusReporter,
};
pub use tools::{
    agent_tools, AggregateResultsTool, CallAgentTool, CollaborativeTaskTool, DelegateToAgentTool,
    ListAgentsTool,
};
