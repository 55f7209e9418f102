//! Connection-owning MCP client.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::{Result, SwitchboardError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::envelope::{DefaultClassifier, EnvelopeClassifier, ToolEnvelope, ToolInfo};
use crate::transport::{Launcher, ServerCommand, StdioLauncher, Transport};

/// Per-client timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    #[serde(default = "default_handshake_ms")]
    pub handshake_ms: u64,
    #[serde(default = "default_list_ms")]
    pub list_ms: u64,
    #[serde(default = "default_call_ms")]
    pub call_ms: u64,
}

fn default_handshake_ms() -> u64 {
    30_000
}

fn default_list_ms() -> u64 {
    30_000
}

fn default_call_ms() -> u64 {
    60_000
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            handshake_ms: default_handshake_ms(),
            list_ms: default_list_ms(),
            call_ms: default_call_ms(),
        }
    }
}

type Slot = Option<Box<dyn Transport>>;

/// Client for one MCP server process.
///
/// The process is started on the first [`connect`](Self::connect) or on the
/// first call that needs it. Requests on one client are serialized: the
/// transport sits behind an async mutex, so at most one request is in flight
/// per connection. A call that times out is abandoned but the connection
/// stays usable for the next one.
pub struct ProtocolClient {
    name: String,
    command: ServerCommand,
    launcher: Arc<dyn Launcher>,
    classifier: Arc<dyn EnvelopeClassifier>,
    timeouts: ClientTimeouts,
    conn: Mutex<Slot>,
    connected: AtomicBool,
}

impl ProtocolClient {
    pub fn new(name: impl Into<String>, command: ServerCommand) -> Self {
        Self::with_launcher(name, command, Arc::new(StdioLauncher))
    }

    pub fn with_launcher(
        name: impl Into<String>,
        command: ServerCommand,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            launcher,
            classifier: Arc::new(DefaultClassifier::default()),
            timeouts: ClientTimeouts::default(),
            conn: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn EnvelopeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Spawn the server and complete the handshake. No-op when connected.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.conn.lock().await;
        self.ensure_connected(&mut slot).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.list_tools_with_timeout(Duration::from_millis(self.timeouts.list_ms))
            .await
    }

    pub async fn list_tools_with_timeout(&self, limit: Duration) -> Result<Vec<ToolInfo>> {
        let operation = format!("tools/list on '{}'", self.name);
        with_deadline(operation, limit, async {
            let mut slot = self.conn.lock().await;
            let transport = self.ensure_connected(&mut slot).await?;
            let tools = transport.list_tools().await?;
            debug!(
                server = %self.name,
                tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "Listed MCP tools"
            );
            Ok(tools)
        })
        .await
    }

    /// Invoke a tool and return its raw envelope.
    ///
    /// Failures the server reports inside the envelope are returned as data;
    /// use [`call_tool_checked`](Self::call_tool_checked) to turn them into
    /// errors.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolEnvelope> {
        self.call_tool_with_timeout(tool, arguments, Duration::from_millis(self.timeouts.call_ms))
            .await
    }

    pub async fn call_tool_with_timeout(
        &self,
        tool: &str,
        arguments: Value,
        limit: Duration,
    ) -> Result<ToolEnvelope> {
        let operation = format!("tools/call {}/{}", self.name, tool);
        with_deadline(operation, limit, async {
            let mut slot = self.conn.lock().await;
            let transport = self.ensure_connected(&mut slot).await?;
            debug!(server = %self.name, tool = %tool, "Calling MCP tool");
            transport.call_tool(tool, arguments).await
        })
        .await
    }

    /// Like [`call_tool`](Self::call_tool) but reports envelopes flagged by
    /// the classifier as [`SwitchboardError::Application`].
    pub async fn call_tool_checked(&self, tool: &str, arguments: Value) -> Result<ToolEnvelope> {
        let envelope = self.call_tool(tool, arguments).await?;
        match self.classifier.application_error(&envelope) {
            Some(message) => Err(SwitchboardError::Application {
                tool: tool.to_string(),
                message,
            }),
            None => Ok(envelope),
        }
    }

    /// Terminate the server process. No-op when not connected.
    pub async fn close(&self) -> Result<()> {
        let transport = {
            let mut slot = self.conn.lock().await;
            self.connected.store(false, Ordering::SeqCst);
            slot.take()
        };

        match transport {
            Some(transport) => {
                info!(server = %self.name, "Closing MCP connection");
                transport.close().await
            }
            None => Ok(()),
        }
    }

    async fn ensure_connected<'a>(
        &self,
        slot: &'a mut MutexGuard<'_, Slot>,
    ) -> Result<&'a mut Box<dyn Transport>> {
        if slot.is_none() {
            let limit = Duration::from_millis(self.timeouts.handshake_ms);
            let launched = tokio::time::timeout(
                limit,
                self.launcher.launch(&self.name, &self.command),
            )
            .await
            .map_err(|_| {
                warn!(server = %self.name, timeout_ms = self.timeouts.handshake_ms, "MCP handshake timed out");
                SwitchboardError::connection(
                    &self.name,
                    format!("handshake timed out after {}ms", self.timeouts.handshake_ms),
                )
            })??;

            **slot = Some(launched);
            self.connected.store(true, Ordering::SeqCst);
            info!(server = %self.name, "Connected to MCP server");
        }

        slot.as_mut()
            .ok_or_else(|| SwitchboardError::connection(&self.name, "not connected"))
    }
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn with_deadline<T>(
    operation: String,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation = %operation, timeout_ms = limit.as_millis() as u64, "MCP request timed out");
            Err(SwitchboardError::timeout(operation, limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let t = ClientTimeouts::default();
        assert_eq!(t.handshake_ms, 30_000);
        assert_eq!(t.list_ms, 30_000);
        assert_eq!(t.call_ms, 60_000);
    }

    #[test]
    fn new_client_is_disconnected() {
        let client = ProtocolClient::new("stripe", ServerCommand::new("stripe-agent.sh", vec![]));
        assert_eq!(client.name(), "stripe");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn close_without_connect_is_noop() {
        let client = ProtocolClient::new("redis", ServerCommand::new("redis-agent.sh", vec![]));
        client.close().await.unwrap();
        assert!(!client.is_connected());
    }
}
