//! High-level MCP client.

use super::transport::{HttpTransport, McpTransport, StdioTransport};
use super::types::*;
use std::collections::HashMap;

/// Speaks the MCP handshake, `tools/list` and `tools/call` over any transport.
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    server_info: Option<ServerInfo>,
}

impl McpClient {
    /// Spawn a server process and complete the handshake.
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        env: Option<&HashMap<String, String>>,
    ) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn(command, args, env).await?;
        let mut client = Self::from_transport(Box::new(transport));
        client.initialize().await?;
        Ok(client)
    }

    pub async fn connect_http(url: &str) -> Result<Self, McpError> {
        let mut client = Self::from_transport(Box::new(HttpTransport::new(url)));
        client.initialize().await?;
        Ok(client)
    }

    /// Wrap a transport without handshaking (useful for testing).
    pub fn from_transport(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport,
            server_info: None,
        }
    }

    pub async fn initialize(&mut self) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": ClientInfo::default()
        });

        let response = self
            .request(JsonRpcRequest::new("initialize", Some(params)))
            .await?;
        let result: InitializeResult = serde_json::from_value(response)?;
        self.server_info = Some(result.server_info.clone());

        self.transport
            .notify(JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        Ok(result.server_info)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let response = self
            .request(JsonRpcRequest::new(
                "tools/list",
                Some(serde_json::json!({})),
            ))
            .await?;
        let result: ToolsListResult = serde_json::from_value(response)?;
        Ok(result.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });
        let response = self
            .request(JsonRpcRequest::new("tools/call", Some(params)))
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    async fn request(&self, request: JsonRpcRequest) -> Result<serde_json::Value, McpError> {
        let response = self.transport.send(request).await?;

        if let Some(error) = response.error {
            return Err(McpError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("Response has neither result nor error".into()))
    }
}
