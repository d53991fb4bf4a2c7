//! MCP (Model Context Protocol) client over stdio.
//!
//! Spawns an MCP server as a child node process and speaks newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout. The session starts with an
//! `initialize` handshake followed by a `notifications/initialized`
//! notification, after which tools can be listed and called.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{AppError, Result};

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "finhealth-backend";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct McpClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl McpClient {
    /// Spawn the MCP server and complete the initialize handshake.
    ///
    /// `env` carries the provider credentials the server needs, e.g.
    /// `XERO_CLIENT_BEARER_TOKEN`.
    pub async fn spawn(server_path: &str, env: &[(&str, &str)]) -> Result<Self> {
        let mut command = Command::new("node");
        command
            .arg(server_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            AppError::Mcp(format!("Failed to spawn MCP server at {server_path}: {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Mcp("MCP server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Mcp("MCP server stdout unavailable".into()))?;

        let mut client = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<()> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(())
    }

    /// Send a request and wait for the matching response, skipping any
    /// server-initiated notifications that arrive in between.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_message(&message).await?;

        tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| AppError::Mcp(format!("MCP request '{method}' timed out")))?
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&message).await
    }

    async fn write_message(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .await
            .map_err(|e| AppError::Mcp(format!("Failed to write to MCP server: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AppError::Mcp(format!("Failed to flush MCP server stdin: {e}")))?;
        Ok(())
    }

    async fn read_response(&mut self, expected_id: u64) -> Result<Value> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| AppError::Mcp(format!("Failed to read from MCP server: {e}")))?;
            if read == 0 {
                return Err(AppError::Mcp("MCP server closed its stdout".into()));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(_) => {
                    // Stray non-JSON output on stdout is ignored
                    tracing::debug!("Skipping non-JSON MCP output: {}", trimmed);
                    continue;
                }
            };

            // Notifications and responses to other requests are skipped
            if message.get("id").and_then(Value::as_u64) != Some(expected_id) {
                continue;
            }

            if let Some(error) = message.get("error") {
                let detail = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(AppError::Mcp(format!("MCP server error: {detail}")));
            }
            return message
                .get("result")
                .cloned()
                .ok_or_else(|| AppError::Mcp("MCP response has neither result nor error".into()));
        }
    }

    /// Names of the tools the server exposes.
    pub async fn list_tools(&mut self) -> Result<Vec<String>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Mcp("tools/list returned no tools array".into()))?;
        Ok(tools
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect())
    }

    /// Call a tool and return its raw result (content blocks and all).
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        self.request(
            "tools/call",
            json!({
                "name": name,
                "arguments": arguments,
            }),
        )
        .await
    }

    /// Terminate the child process. Also happens on drop via kill_on_drop.
    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("MCP server already exited: {}", e);
        }
    }
}
