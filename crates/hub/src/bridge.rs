//! Bridge to external MCP servers.
//!
//! Servers are read from a JSON file in the common `mcpServers` layout:
//!
//! ```json
//! { "mcpServers": { "fs": { "command": "npx", "args": ["-y", "server-fs"] } } }
//! ```
//!
//! A client per server is created on first use. Tool listings are cached per
//! server for a TTL.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use switchboard_common::{Result, SwitchboardError};
use switchboard_mcp::{Launcher, ProtocolClient, ServerCommand, StdioLauncher, ToolInfo};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::tool::{ToolCategory, ToolSummary};

#[derive(Debug, Deserialize)]
struct McpServersFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, ServerEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// Parse an `mcpServers` document. Entries without a command are skipped.
pub fn parse_servers(json: &str) -> Result<BTreeMap<String, ServerCommand>> {
    let file: McpServersFile = serde_json::from_str(json)
        .map_err(|e| SwitchboardError::Config(format!("invalid MCP server config: {e}")))?;

    let mut servers = BTreeMap::new();
    for (name, entry) in file.mcp_servers {
        match entry.command.filter(|c| !c.is_empty()) {
            Some(command) => {
                let mut cmd = ServerCommand::new(command, entry.args);
                cmd.env = entry.env;
                servers.insert(name, cmd);
            }
            None => warn!(server = %name, "Skipping MCP server without a command"),
        }
    }
    Ok(servers)
}

/// Split `server/tool` or `server:tool`. The slash form is checked first and
/// only the first separator counts.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once('/')
        .or_else(|| name.split_once(':'))
        .filter(|(server, tool)| !server.is_empty() && !tool.is_empty())
}

struct CacheEntry {
    tools: Vec<ToolInfo>,
    fetched_at: Instant,
}

pub struct RemoteBridge {
    servers: BTreeMap<String, ServerCommand>,
    launcher: Arc<dyn Launcher>,
    clients: Mutex<HashMap<String, Arc<ProtocolClient>>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl RemoteBridge {
    pub fn new(servers: BTreeMap<String, ServerCommand>, launcher: Arc<dyn Launcher>) -> Self {
        let defaults = HubConfig::default();
        Self {
            servers,
            launcher,
            clients: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            ttl: defaults.ttl(),
            list_timeout: defaults.list_timeout(),
            call_timeout: defaults.call_timeout(),
        }
    }

    pub fn with_timings(mut self, ttl: Duration, list_timeout: Duration, call_timeout: Duration) -> Self {
        self.ttl = ttl;
        self.list_timeout = list_timeout;
        self.call_timeout = call_timeout;
        self
    }

    /// Build from hub config, reading the server file. A missing file yields
    /// a bridge with no servers.
    pub async fn from_config(config: &HubConfig) -> Result<Self> {
        Self::from_config_with_launcher(config, Arc::new(StdioLauncher)).await
    }

    pub async fn from_config_with_launcher(
        config: &HubConfig,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self> {
        let servers = load_servers(&config.mcp_config_path).await?;
        info!(
            path = %config.mcp_config_path.display(),
            servers = ?servers.keys().collect::<Vec<_>>(),
            "Loaded MCP bridge servers"
        );
        Ok(Self::new(servers, launcher).with_timings(
            config.ttl(),
            config.list_timeout(),
            config.call_timeout(),
        ))
    }

    pub fn servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn has_server(&self, server: &str) -> bool {
        self.servers.contains_key(server)
    }

    fn client(&self, server: &str) -> Result<Arc<ProtocolClient>> {
        let command = self
            .servers
            .get(server)
            .ok_or_else(|| SwitchboardError::UnknownServer(server.to_string()))?;

        let mut clients = self.clients.lock();
        let client = clients.entry(server.to_string()).or_insert_with(|| {
            debug!(server = %server, "Creating bridged MCP client");
            Arc::new(ProtocolClient::with_launcher(
                server,
                command.clone(),
                self.launcher.clone(),
            ))
        });
        Ok(client.clone())
    }

    /// Tools offered by `server`, from cache unless expired or forced.
    pub async fn list_remote_tools(&self, server: &str, force_refresh: bool) -> Result<Vec<ToolInfo>> {
        if !force_refresh {
            let cached = self
                .cache
                .lock()
                .get(server)
                .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
                .map(|entry| entry.tools.clone());
            if let Some(tools) = cached {
                debug!(server = %server, "Remote tools served from cache");
                return Ok(tools);
            }
        }

        let client = self.client(server)?;
        let tools = client.list_tools_with_timeout(self.list_timeout).await?;

        info!(server = %server, count = tools.len(), "Fetched remote tools");
        self.cache.lock().insert(
            server.to_string(),
            CacheEntry {
                tools: tools.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(tools)
    }

    /// Force-refresh every server. Failures are logged and the server is
    /// left out of the result.
    pub async fn refresh_remote_tools(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for server in self.servers.keys() {
            match self.list_remote_tools(server, true).await {
                Ok(tools) => {
                    counts.insert(server.clone(), tools.len());
                }
                Err(e) => warn!(server = %server, error = %e, "Failed to refresh remote tools"),
            }
        }
        counts
    }

    /// All remote tools as `server/tool` summaries.
    pub async fn remote_tools_summary(&self) -> Vec<ToolSummary> {
        let mut summary = Vec::new();
        for server in self.servers.keys() {
            match self.list_remote_tools(server, false).await {
                Ok(tools) => summary.extend(tools.into_iter().map(|tool| ToolSummary {
                    name: format!("{server}/{}", tool.name),
                    description: tool.description.unwrap_or_default(),
                    category: ToolCategory::Dev,
                })),
                Err(e) => warn!(server = %server, error = %e, "Skipping server in tool summary"),
            }
        }
        summary
    }

    /// Call `tool` on `server` with the bridge's call timeout.
    ///
    /// An envelope flagged `isError` is an [`SwitchboardError::Application`].
    pub async fn call(&self, server: &str, tool: &str, args: Value) -> Result<Value> {
        let client = self.client(server)?;
        let envelope = client
            .call_tool_with_timeout(tool, args, self.call_timeout)
            .await?;

        if envelope.is_error {
            return Err(SwitchboardError::Application {
                tool: format!("{server}/{tool}"),
                message: envelope.joined_text(),
            });
        }
        Ok(envelope.decode_payload())
    }

    pub async fn shutdown(&self) {
        let clients: Vec<(String, Arc<ProtocolClient>)> = self.clients.lock().drain().collect();
        for (server, client) in clients {
            if let Err(e) = client.close().await {
                warn!(server = %server, error = %e, "Failed to close bridged client");
            }
        }
    }
}

async fn load_servers(path: &Path) -> Result<BTreeMap<String, ServerCommand>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => parse_servers(&json),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No MCP server config found, bridge has no servers");
            Ok(BTreeMap::new())
        }
        Err(e) => Err(e.into()),
    }
}
