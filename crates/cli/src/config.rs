//! Top-level configuration file.
//!
//! # Security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing API keys
//! - Warns about API keys stored in config files

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_common::events::DEFAULT_QUEUE_CAPACITY;
use switchboard_hub::{HubConfig, ToolsConfig};
use switchboard_router::{BackendKind, RouterConfig};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub hub: HubConfig,

    /// Automation log sink for workflow summaries.
    #[serde(default)]
    pub log_sink: LogSinkConfig,

    /// Settings for the default marketplace tools.
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Append every orchestration event to this file as JSON lines.
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            jsonl_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    /// PostgREST table URL. Unset disables the sink.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_log_sink_key_env")]
    pub api_key_env: String,

    /// Upper bound on one row insert.
    #[serde(default = "default_log_sink_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_log_sink_timeout_ms() -> u64 {
    10_000
}

fn default_log_sink_key_env() -> String {
    "SUPABASE_SERVICE_ROLE_KEY".into()
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: default_log_sink_key_env(),
            timeout_ms: default_log_sink_timeout_ms(),
        }
    }
}

impl LogSinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl SwitchboardConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    ///
    /// On Unix the file must be a regular file, must not be world-writable,
    /// and must not be world-readable when it contains an API key.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let mut config = Self::from_file_unchecked(path)?;

        if config.has_inline_api_key() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (api_key_env).",
                path.display()
            );
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks or
    /// environment overrides.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Built-in defaults plus environment overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.hub.apply_env_overrides()?;
        Ok(())
    }

    fn has_inline_api_key(&self) -> bool {
        self.router.backends.iter().any(|b| match &b.kind {
            BackendKind::Hosted(hosted) => hosted.llm.api_key.as_deref().is_some_and(|k| !k.is_empty()),
            BackendKind::Subprocess(_) => false,
        })
    }
}

/// Validate config file permissions on Unix systems.
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_api_key = content.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("api_key") && !line.starts_with("api_key_env")
    });

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
