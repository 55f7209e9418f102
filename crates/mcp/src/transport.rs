//! Process transport seam.
//!
//! [`Launcher`] starts a server and hands back a [`Transport`] speaking MCP to
//! it. Production code uses [`StdioLauncher`], which spawns the child with
//! `tokio::process` and runs the protocol through `rmcp`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::{Result, SwitchboardError};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::envelope::{ContentPart, ToolEnvelope, ToolInfo};

/// How to start an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl ServerCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            cwd: None,
        }
    }
}

/// A live MCP session with one server process.
#[async_trait]
pub trait Transport: Send {
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>>;

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolEnvelope>;

    /// Shut the session down and terminate the process.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts server processes.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, server: &str, command: &ServerCommand) -> Result<Box<dyn Transport>>;
}

/// Spawns the server as a child process and speaks MCP over its stdio.
#[derive(Debug, Clone, Default)]
pub struct StdioLauncher;

#[async_trait]
impl Launcher for StdioLauncher {
    async fn launch(&self, server: &str, command: &ServerCommand) -> Result<Box<dyn Transport>> {
        info!(
            server = %server,
            command = %command.command,
            args = ?command.args,
            "Spawning MCP server"
        );

        let mut cmd = Command::new(&command.command);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let child_transport = TokioChildProcess::new(&mut cmd)
            .map_err(|e| SwitchboardError::connection(server, format!("spawn failed: {e}")))?;

        // The unit handler ignores server-initiated requests.
        let service = ().serve(child_transport).await.map_err(|e| {
            SwitchboardError::connection(server, format!("initialize handshake failed: {e}"))
        })?;

        Ok(Box::new(RmcpTransport {
            server: server.to_string(),
            service,
        }))
    }
}

/// [`Transport`] backed by an `rmcp` client session.
pub struct RmcpTransport {
    server: String,
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl Transport for RmcpTransport {
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        let tools = self.service.peer().list_all_tools().await.map_err(|e| {
            SwitchboardError::Protocol(format!("tools/list on '{}' failed: {e}", self.server))
        })?;

        tools
            .into_iter()
            .map(|tool| {
                let value = serde_json::to_value(&tool)?;
                serde_json::from_value::<ToolInfo>(value).map_err(|e| {
                    SwitchboardError::Protocol(format!(
                        "malformed tool descriptor from '{}': {e}",
                        self.server
                    ))
                })
            })
            .collect()
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolEnvelope> {
        debug!(server = %self.server, tool = %name, "Calling MCP tool");

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_string(), other);
                Some(map)
            }
        };

        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };

        let result = self
            .service
            .peer()
            .call_tool(request)
            .await
            .map_err(|e| SwitchboardError::tool_call(name, e))?;

        let content = result
            .content
            .iter()
            .map(|c| {
                serde_json::to_value(c)
                    .ok()
                    .and_then(|v| serde_json::from_value::<ContentPart>(v).ok())
                    .unwrap_or(ContentPart::Unsupported)
            })
            .collect();

        Ok(ToolEnvelope {
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let RmcpTransport { server, service } = *self;
        match service.cancel().await {
            Ok(reason) => {
                debug!(server = %server, reason = ?reason, "MCP session closed");
                Ok(())
            }
            Err(e) => {
                warn!(server = %server, error = %e, "MCP session did not shut down cleanly");
                Err(SwitchboardError::connection(server, format!("close failed: {e}")))
            }
        }
    }
}
