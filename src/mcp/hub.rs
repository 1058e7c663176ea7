//! Connection management for every configured MCP server.

use super::client::McpClient;
use super::tool_adapter::McpToolAdapter;
use super::types::McpError;
use crate::tool::AgentTool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How to reach one MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Source name; prefixes every tool this server exposes.
    pub name: String,
    pub transport: McpTransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Option<HashMap<String, String>>,
    },
    Http {
        url: String,
    },
}

/// Connection state of one source, as reported by tool listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ServerStatus {
    Connected { tools: usize },
    Failed { error: String },
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    #[serde(flatten)]
    pub status: ServerStatus,
}

/// A live client plus its connected flag, shared by every adapter of that source.
pub struct McpConnection {
    name: String,
    client: McpClient,
    connected: AtomicBool,
}

impl McpConnection {
    pub fn new(name: impl Into<String>, client: McpClient) -> Self {
        Self {
            name: name.into(),
            client,
            connected: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.client.close().await {
                warn!("Closing MCP server '{}' failed: {}", self.name, e);
            }
            info!("Disconnected MCP server '{}'", self.name);
        }
    }
}

struct Source {
    connection: Option<Arc<McpConnection>>,
    tools: Vec<Arc<McpToolAdapter>>,
    failure: Option<String>,
}

/// Every MCP source the process knows about.
///
/// Unreachable servers are recorded as [`ServerStatus::Failed`] and contribute
/// no tools; the rest of the tool set still works.
#[derive(Default)]
pub struct McpHub {
    sources: RwLock<Vec<(String, Source)>>,
}

impl McpHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to every configured server, tolerating failures.
    pub async fn connect_all(configs: &[McpServerConfig]) -> Self {
        let hub = Self::new();
        for config in configs {
            let connected = match &config.transport {
                McpTransportConfig::Stdio { command, args, env } => {
                    McpClient::connect_stdio(command, args, env.as_ref()).await
                }
                McpTransportConfig::Http { url } => McpClient::connect_http(url).await,
            };
            match connected {
                Ok(client) => {
                    if let Err(e) = hub.attach(&config.name, client).await {
                        hub.record_failure(&config.name, &e);
                    }
                }
                Err(e) => hub.record_failure(&config.name, &e),
            }
        }
        hub
    }

    /// Register an already-initialized client under `name` and list its tools.
    pub async fn attach(&self, name: &str, client: McpClient) -> Result<usize, McpError> {
        let tools = client.list_tools().await?;
        let connection = Arc::new(McpConnection::new(name, client));
        let adapters: Vec<Arc<McpToolAdapter>> = tools
            .into_iter()
            .map(|t| Arc::new(McpToolAdapter::new(connection.clone(), t)))
            .collect();
        let count = adapters.len();
        info!("MCP server '{}' connected with {} tool(s)", name, count);

        self.insert(
            name,
            Source {
                connection: Some(connection),
                tools: adapters,
                failure: None,
            },
        );
        Ok(count)
    }

    fn record_failure(&self, name: &str, error: &McpError) {
        warn!("MCP server '{}' unavailable, continuing without it: {}", name, error);
        self.insert(
            name,
            Source {
                connection: None,
                tools: Vec::new(),
                failure: Some(error.to_string()),
            },
        );
    }

    fn insert(&self, name: &str, source: Source) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        match sources.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = source,
            None => sources.push((name.to_string(), source)),
        }
    }

    /// Tools from every source, each under its composed name.
    pub fn tools(&self) -> Vec<Arc<dyn AgentTool>> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources
            .iter()
            .flat_map(|(_, s)| s.tools.iter().map(|t| t.clone() as Arc<dyn AgentTool>))
            .collect()
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources
            .iter()
            .map(|(name, s)| {
                let status = match (&s.connection, &s.failure) {
                    (_, Some(error)) => ServerStatus::Failed {
                        error: error.clone(),
                    },
                    (Some(c), None) if c.is_connected() => ServerStatus::Connected {
                        tools: s.tools.len(),
                    },
                    _ => ServerStatus::Disconnected,
                };
                SourceStatus {
                    name: name.clone(),
                    status,
                }
            })
            .collect()
    }

    fn connections(&self) -> Vec<Arc<McpConnection>> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources
            .iter()
            .filter_map(|(_, s)| s.connection.clone())
            .collect()
    }

    pub async fn disconnect(&self, name: &str) {
        for connection in self.connections() {
            if connection.name() == name {
                connection.disconnect().await;
            }
        }
    }

    pub async fn disconnect_all(&self) {
        for connection in self.connections() {
            connection.disconnect().await;
        }
    }

    /// Disconnect everything once `shutdown` fires.
    pub fn close_on_shutdown(self: &Arc<Self>, shutdown: CancellationToken) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            shutdown.cancelled().await;
            info!("Shutdown requested, closing MCP connections");
            hub.disconnect_all().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::McpTransport;
    use crate::mcp::types::*;
    use crate::registry::ToolRegistry;
    use crate::tool::ToolKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers `tools/list` with a fixed listing and `tools/call` by echoing
    /// which source handled it.
    struct FakeServer {
        source: &'static str,
        tools: serde_json::Value,
        calls: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn new(source: &'static str, tools: serde_json::Value) -> Self {
            Self {
                source,
                tools,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl McpTransport for FakeServer {
        async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
            let result = match request.method.as_str() {
                "tools/list" => json!({"tools": self.tools}),
                "tools/call" => {
                    let params = request.params.unwrap_or_default();
                    self.calls
                        .lock()
                        .unwrap()
                        .push(params["name"].as_str().unwrap_or_default().to_string());
                    json!({
                        "content": [{"type": "text", "text": format!("{} handled {}", self.source, params["name"])}],
                        "isError": false
                    })
                }
                other => return Err(McpError::Protocol(format!("unexpected {}", other))),
            };
            Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id,
                result: Some(result),
                error: None,
            })
        }

        async fn notify(&self, _notification: JsonRpcRequest) -> Result<(), McpError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), McpError> {
            Ok(())
        }
    }

    fn read_tool() -> serde_json::Value {
        json!([{
            "name": "read",
            "description": "Read a file",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }])
    }

    async fn hub_with(servers: Vec<FakeServer>) -> McpHub {
        let hub = McpHub::new();
        for server in servers {
            let name = server.source;
            hub.attach(name, McpClient::from_transport(Box::new(server)))
                .await
                .unwrap();
        }
        hub
    }

    #[tokio::test]
    async fn same_named_tools_from_two_sources_both_survive() {
        let hub = hub_with(vec![
            FakeServer::new("files", read_tool()),
            FakeServer::new("docs", read_tool()),
        ])
        .await;

        let mut registry = ToolRegistry::new();
        registry.extend(hub.tools());
        assert_eq!(registry.names(), vec!["files_read", "docs_read"]);

        let (files, _) = registry.invoke("files_read", json!({"path": "a"})).await;
        let (docs, _) = registry.invoke("docs_read", json!({"path": "a"})).await;
        assert_eq!(files["content"], "files handled \"read\"");
        assert_eq!(docs["content"], "docs handled \"read\"");
    }

    #[tokio::test]
    async fn colliding_composed_names_keep_the_later_source() {
        let hub = hub_with(vec![
            FakeServer::new("a_b", json!([{"name": "c"}])),
            FakeServer::new("a", json!([{"name": "b_c"}])),
        ])
        .await;

        let mut registry = ToolRegistry::new();
        let replaced: Vec<_> = hub
            .tools()
            .into_iter()
            .filter_map(|tool| registry.register(tool))
            .collect();

        assert_eq!(registry.names(), vec!["a_b_c"]);
        assert_eq!(replaced.len(), 1);
        assert_eq!(
            replaced[0].kind(),
            ToolKind::Remote {
                source: "a_b".into()
            }
        );
        let (payload, _) = registry.invoke("a_b_c", json!({})).await;
        assert_eq!(payload["content"], "a handled \"b_c\"");
    }

    #[tokio::test]
    async fn remote_schema_is_enforced_locally() {
        let hub = hub_with(vec![FakeServer::new("files", read_tool())]).await;
        let mut registry = ToolRegistry::new();
        registry.extend(hub.tools());

        let (payload, is_error) = registry.invoke("files_read", json!({})).await;
        assert!(is_error);
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("path"));
    }

    #[tokio::test]
    async fn model_sees_the_server_schema_unchanged() {
        let input_schema = json!({
            "type": "object",
            "properties": {
                "mode": {"type": "string", "enum": ["fast", "slow"]},
                "count": {"type": "integer", "minimum": 1}
            },
            "required": ["mode"],
            "additionalProperties": false
        });
        let tools = json!([
            {"name": "scan", "inputSchema": input_schema},
            {"name": "ping"}
        ]);
        let hub = hub_with(vec![FakeServer::new("scanner", tools)]).await;
        let mut registry = ToolRegistry::new();
        registry.extend(hub.tools());

        let defs = registry.definitions();
        assert_eq!(defs[0].parameters, input_schema);
        assert_eq!(
            defs[0].parameters["properties"]["mode"]["enum"],
            json!(["fast", "slow"])
        );
        assert_eq!(
            defs[1].parameters,
            json!({"type": "object", "properties": {}})
        );

        // Validation still runs against the translated schema.
        let (payload, is_error) = registry.invoke("scanner_scan", json!({"mode": 3})).await;
        assert!(is_error);
        assert!(payload["error"].as_str().unwrap().contains("mode"));
    }

    #[tokio::test]
    async fn disconnected_server_yields_failure_payload() {
        let hub = hub_with(vec![FakeServer::new("files", read_tool())]).await;
        let mut registry = ToolRegistry::new();
        registry.extend(hub.tools());

        hub.disconnect("files").await;
        let (payload, is_error) = registry.invoke("files_read", json!({"path": "a"})).await;
        assert!(is_error);
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("files"));
        assert!(payload["hint"].is_string());
        assert_eq!(
            hub.statuses()[0].status,
            ServerStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn unreachable_server_degrades_to_failed_status() {
        let configs = vec![McpServerConfig {
            name: "ghost".into(),
            transport: McpTransportConfig::Stdio {
                command: "/definitely/not/a/binary".into(),
                args: vec![],
                env: None,
            },
        }];
        let hub = McpHub::connect_all(&configs).await;
        assert!(hub.tools().is_empty());
        let statuses = hub.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(matches!(statuses[0].status, ServerStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn shutdown_token_closes_connections() {
        let hub = Arc::new(hub_with(vec![FakeServer::new("files", read_tool())]).await);
        let shutdown = CancellationToken::new();
        hub.close_on_shutdown(shutdown.clone());

        shutdown.cancel();
        for _ in 0..50 {
            if hub.statuses()[0].status == ServerStatus::Disconnected {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.statuses()[0].status, ServerStatus::Disconnected);
    }

    #[test]
    fn server_config_deserializes() {
        let cfg: McpServerConfig = serde_json::from_value(json!({
            "name": "fs",
            "transport": {"type": "stdio", "command": "npx", "args": ["-y", "server-fs"]}
        }))
        .unwrap();
        assert_eq!(cfg.name, "fs");
        assert!(matches!(cfg.transport, McpTransportConfig::Stdio { ref args, .. } if args.len() == 2));
    }
}
