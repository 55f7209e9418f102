//! Hub configuration with environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_common::{Result, SwitchboardError};
use tracing::warn;

pub const ENV_BRIDGE_ENABLED: &str = "SWITCHBOARD_BRIDGE_ENABLED";
pub const ENV_MCP_CONFIG: &str = "SWITCHBOARD_MCP_CONFIG";
pub const ENV_REMOTE_TOOLS_TTL_MS: &str = "SWITCHBOARD_REMOTE_TOOLS_TTL_MS";
pub const ENV_REMOTE_LIST_TIMEOUT_MS: &str = "SWITCHBOARD_REMOTE_LIST_TIMEOUT_MS";
pub const ENV_REMOTE_CALL_TIMEOUT_MS: &str = "SWITCHBOARD_REMOTE_CALL_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Route `server/tool` names to external MCP servers.
    #[serde(default)]
    pub bridge_enabled: bool,

    /// JSON file in the `{"mcpServers": {...}}` format.
    #[serde(default = "default_mcp_config_path")]
    pub mcp_config_path: PathBuf,

    #[serde(default = "default_ttl_ms")]
    pub remote_tools_ttl_ms: u64,

    #[serde(default = "default_list_timeout_ms")]
    pub remote_list_timeout_ms: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub remote_call_timeout_ms: u64,
}

fn default_mcp_config_path() -> PathBuf {
    PathBuf::from(".roo/mcp.json")
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_list_timeout_ms() -> u64 {
    30_000
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bridge_enabled: false,
            mcp_config_path: default_mcp_config_path(),
            remote_tools_ttl_ms: default_ttl_ms(),
            remote_list_timeout_ms: default_list_timeout_ms(),
            remote_call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl HubConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.remote_tools_ttl_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_list_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_call_timeout_ms)
    }

    /// Apply `SWITCHBOARD_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_BRIDGE_ENABLED) {
            self.bridge_enabled = parse_flag(&v);
        }
        if let Some(v) = lookup(ENV_MCP_CONFIG).filter(|v| !v.is_empty()) {
            self.mcp_config_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_REMOTE_TOOLS_TTL_MS) {
            self.remote_tools_ttl_ms = parse_ms(ENV_REMOTE_TOOLS_TTL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_REMOTE_LIST_TIMEOUT_MS) {
            self.remote_list_timeout_ms = parse_ms(ENV_REMOTE_LIST_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_REMOTE_CALL_TIMEOUT_MS) {
            self.remote_call_timeout_ms = parse_ms(ENV_REMOTE_CALL_TIMEOUT_MS, &v)?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            warn!(value = %other, "Unrecognized boolean, treating as false");
            false
        }
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| SwitchboardError::Config(format!("{key} must be milliseconds, got '{value}'")))
}
