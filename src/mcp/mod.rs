//! MCP (Model Context Protocol) tool sources.
//!
//! Each configured server is a named source. Its tools join the tool set as
//! `<source>_<tool>` with their JSON Schema translated into a local [`Schema`].
//!
//! ```rust,no_run
//! use switchboard::mcp::{McpHub, McpServerConfig, McpTransportConfig};
//!
//! # async fn example() {
//! let hub = McpHub::connect_all(&[McpServerConfig {
//!     name: "files".into(),
//!     transport: McpTransportConfig::Stdio {
//!         command: "npx".into(),
//!         args: vec!["-y".into(), "@modelcontextprotocol/server-filesystem".into(), "/tmp".into()],
//!         env: None,
//!     },
//! }])
//! .await;
//! println!("{} remote tool(s)", hub.tools().len());
//! # }
//! ```
//!
//! [`Schema`]: crate::schema::Schema

pub mod client;
pub mod hub;
pub mod tool_adapter;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use hub::{McpConnection, McpHub, McpServerConfig, McpTransportConfig, ServerStatus, SourceStatus};
pub use tool_adapter::McpToolAdapter;
pub use transport::{HttpTransport, McpTransport, StdioTransport};
pub use types::{McpContent, McpError, McpToolCallResult, McpToolInfo, ServerInfo};
