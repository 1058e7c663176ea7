//! `Broker`: the assembled service behind every exposed operation.
//!
//! ```rust,no_run
//! use switchboard::{Broker, BrokerConfig, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig::from_json_file("broker.json")?;
//! let broker = Broker::start(config).await;
//!
//! let mut events = broker.chat(vec![Message::user("What changed in the last release?")]);
//! while let Some(event) = events.recv().await {
//!     print!("{}", event.to_sse());
//! }
//! broker.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::agents::{
    agent_tools, ActiveStatus, AgentExecutor, AgentRegistry, AgentResult, AgentSummary,
    CollaborationReport, Orchestrator, StatusBoard, StatusReporter,
};
use crate::chat::{ChatEvent, ChatLoop, ChatSink};
use crate::config::BrokerConfig;
use crate::mcp::{McpHub, SourceStatus};
use crate::provider::{OpenAiCompatProvider, ProviderError, StreamProvider};
use crate::registry::{ToolInfo, ToolRegistry};
use crate::skills::{skill_tools, SkillCatalog, SkillError};
use crate::step_loop::ModelClient;
use crate::tool::AgentTool;
use crate::types::Message;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools, \
skills and a team of specialist agents. Use tools when they help answer the user. For work \
that needs one specialist, use callAgent; for work that spans several, use collaborativeTask. \
Tool failures come back as results with success=false; explain them and carry on.";

/// What the tool-listing operation returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolListing {
    pub tools: Vec<ToolInfo>,
    pub servers: Vec<SourceStatus>,
}

pub struct Broker {
    hub: Arc<McpHub>,
    skills: Arc<SkillCatalog>,
    status: Arc<StatusBoard>,
    orchestrator: Arc<Orchestrator>,
    chat: ChatLoop,
    system_prompt: String,
    shutdown: CancellationToken,
}

impl Broker {
    /// Connect to everything in `config`, talking to an OpenAI-compatible API.
    pub async fn start(config: BrokerConfig) -> Self {
        let provider = Arc::new(OpenAiCompatProvider::new(config.model.base_url.clone()));
        Self::start_with_provider(config, provider).await
    }

    /// Like [`Broker::start`] with a caller-chosen provider.
    pub async fn start_with_provider(
        config: BrokerConfig,
        provider: Arc<dyn StreamProvider>,
    ) -> Self {
        let hub = McpHub::connect_all(&config.mcp_servers).await;
        Self::assemble(config, provider, hub, Vec::new())
    }

    /// Build from already-connected parts. `local_tools` join the shared tool
    /// set next to the MCP and skill tools.
    pub fn assemble(
        config: BrokerConfig,
        provider: Arc<dyn StreamProvider>,
        hub: McpHub,
        local_tools: Vec<Arc<dyn AgentTool>>,
    ) -> Self {
        let hub = Arc::new(hub);
        let shutdown = CancellationToken::new();
        hub.close_on_shutdown(shutdown.clone());

        let skills = Arc::new(SkillCatalog::new(config.skill_dirs.clone()));
        let model = ModelClient::new(provider, config.model.settings())
            .with_retry_config(config.retry.clone());

        let mut shared = ToolRegistry::new();
        shared.extend(hub.tools());
        shared.extend(skill_tools(skills.clone()));
        shared.extend(local_tools);

        let status = Arc::new(StatusBoard::new());
        let executor = AgentExecutor::new(model.clone(), Arc::new(AgentRegistry::builtin()), shared.clone())
            .with_max_steps(config.limits.agent_steps)
            .with_status(status.clone() as Arc<dyn StatusReporter>);
        let orchestrator = Arc::new(
            Orchestrator::new(executor).with_planning_steps(config.limits.planning_steps),
        );

        let mut chat_tools = shared;
        chat_tools.extend(agent_tools(orchestrator.clone()));
        info!("Broker ready with {} tool(s)", chat_tools.len());

        let system_prompt = config
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let chat = ChatLoop::new(model, chat_tools, system_prompt.clone())
            .with_max_steps(config.limits.chat_steps);

        Self {
            hub,
            skills,
            status,
            orchestrator,
            chat,
            system_prompt,
            shutdown,
        }
    }

    /// Base prompt plus the current skill index.
    /// Base prompt plus the skill index. The index scan runs on the blocking pool.
    async fn chat_system_prompt(base: String, skills: Arc<SkillCatalog>) -> String {
        let fallback = base.clone();
        let prompt = tokio::task::spawn_blocking(move || {
            let index = skills.format_for_prompt();
            if index.is_empty() {
                base
            } else {
                format!("{}\n\n{}", base, index)
            }
        })
        .await;
        prompt.unwrap_or_else(|e| {
            warn!("Skill index unavailable: {}", e);
            fallback
        })
    }

    /// Start a chat turn. The receiver always ends with [`ChatEvent::Done`].
    pub fn chat(&self, messages: Vec<Message>) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (sink, rx) = ChatSink::channel();
        let chat = self.chat.clone();
        let base = self.system_prompt.clone();
        let skills = Arc::clone(&self.skills);
        tokio::spawn(async move {
            let prompt = Self::chat_system_prompt(base, skills).await;
            chat.with_system_prompt(prompt).run(messages, sink).await
        });
        rx
    }

    pub fn chat_stream(&self, messages: Vec<Message>) -> UnboundedReceiverStream<ChatEvent> {
        UnboundedReceiverStream::new(self.chat(messages))
    }

    pub fn tools(&self) -> ToolListing {
        ToolListing {
            tools: self.chat.tools().infos(),
            servers: self.hub.statuses(),
        }
    }

    pub fn agents(&self) -> Vec<AgentSummary> {
        self.orchestrator.executor().agents().summaries()
    }

    pub async fn run_agent(&self, agent_name: &str, task: &str, context: Option<&str>) -> AgentResult {
        self.orchestrator
            .executor()
            .run(agent_name, task, context, &ToolRegistry::new())
            .await
    }

    pub async fn collaborate(&self, task: &str) -> Result<CollaborationReport, ProviderError> {
        self.orchestrator.run(task, &ToolRegistry::new()).await
    }

    pub fn active_status(&self) -> ActiveStatus {
        self.status.current()
    }

    pub fn status_board(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    /// Rescan skill directories.
    pub fn reload_skills(&self) -> Result<usize, SkillError> {
        self.skills.reload()
    }

    /// Token that, once cancelled, closes every MCP connection. Hand it to a
    /// signal handler.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close every MCP connection. In-flight chat turns are not cancelled;
    /// their remote tool calls fail from here on.
    pub async fn shutdown(&self) {
        info!("Broker shutting down");
        self.shutdown.cancel();
        self.hub.disconnect_all().await;
    }
}
