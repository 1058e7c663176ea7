//! MCP transport implementations: stdio and HTTP.

use super::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// Transport trait for MCP communication.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and receive its response.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;
    /// Send a notification. No response is read.
    async fn notify(&self, notification: JsonRpcRequest) -> Result<(), McpError>;
    async fn close(&self) -> Result<(), McpError>;
}

// ---------------------------------------------------------------------------
// Stdio Transport
// ---------------------------------------------------------------------------

/// Talks to a child process over stdin/stdout, one JSON-RPC message per line.
pub struct StdioTransport {
    io: Mutex<StdioPipes>,
    child: Mutex<Child>,
}

struct StdioPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioPipes {
    async fn write_line(&mut self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(format!("Write error: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("Flush error: {}", e)))
    }
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: Option<&HashMap<String, String>>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        if let Some(env_vars) = env {
            cmd.envs(env_vars);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Transport(format!("Failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("Failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("Failed to capture stdout".into()))?;

        Ok(Self {
            io: Mutex::new(StdioPipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let mut io = self.io.lock().await;
        io.write_line(&request).await?;

        // Skip server-initiated notifications until our response arrives.
        loop {
            let mut line = String::new();
            let bytes_read = io
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::Transport(format!("Read error: {}", e)))?;
            if bytes_read == 0 {
                return Err(McpError::ConnectionClosed);
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response: JsonRpcResponse = serde_json::from_str(line)?;
            if response.id.is_some() && response.id == request.id {
                return Ok(response);
            }
            debug!("Ignoring unsolicited MCP message: {}", line);
        }
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<(), McpError> {
        self.io.lock().await.write_line(&notification).await
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP Transport
// ---------------------------------------------------------------------------

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, message: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let resp = self
            .client
            .post(&self.base_url)
            .header("accept", "application/json")
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP error: {}", e)))?;

        if !resp.status().is_success() {
            return Err(McpError::Transport(format!(
                "HTTP {} from server",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.post(&request)
            .await?
            .json()
            .await
            .map_err(|e| McpError::Transport(format!("Response parse error: {}", e)))
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<(), McpError> {
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}
