pub mod agents;
pub mod broker;
pub mod chat;
pub mod config;
pub mod mcp;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod skills;
pub mod step_loop;
pub mod tool;
pub mod types;

pub use agents::{AgentExecutor, AgentRegistry, AgentResult, Orchestrator, StatusBoard};
pub use broker::{Broker, ToolListing};
pub use chat::{ChatEvent, ChatLoop, ChatSink};
pub use config::{BrokerConfig, ConfigError};
pub use registry::ToolRegistry;
pub use retry::RetryConfig;
pub use schema::Schema;
pub use skills::SkillCatalog;
pub use step_loop::{GenerateOutput, GenerateRequest, ModelClient, ModelSettings};
pub use tool::{AgentTool, ToolError, ToolKind};
pub use types::*;
