//! Router configuration: backends, routing rules, planner and retry policy.

use serde::{Deserialize, Serialize};
use switchboard_llm::LlmConfig;
use switchboard_mcp::{ClientTimeouts, ServerCommand};

use crate::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_backends")]
    pub backends: Vec<AgentDescriptor>,

    /// Evaluated in order; the first matching rule picks the backend.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,

    /// Hosted backend asked to pick an operation when none is given.
    #[serde(default = "default_planner")]
    pub planner: Option<String>,

    /// Report envelopes flagged as failures as `Application` errors.
    #[serde(default = "default_true")]
    pub surface_application_errors: bool,

    /// Extra text prefixes that mark a tool result as failed.
    #[serde(default)]
    pub error_markers: Vec<String>,

    #[serde(default)]
    pub timeouts: ClientTimeouts,

    /// Retries for hosted backends whose outcome looks transient.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            rules: default_rules(),
            planner: default_planner(),
            surface_application_errors: true,
            error_markers: Vec::new(),
            timeouts: ClientTimeouts::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Static description of one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Registry key. Matched case-insensitively.
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    Subprocess(SubprocessBackend),
    Hosted(HostedBackend),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessBackend {
    #[serde(flatten)]
    pub command: ServerCommand,
    /// Operation used when neither the caller nor the planner picks one.
    pub default_operation: String,
    /// Menu offered to the planner. Empty means ask the server.
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema or example of the arguments.
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedBackend {
    #[serde(flatten)]
    pub llm: LlmConfig,
    /// Skip registration when no API key can be resolved.
    #[serde(default = "default_true")]
    pub require_api_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub backend: String,
    pub keywords: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_planner() -> Option<String> {
    Some("jules".into())
}

fn rule(backend: &str, keywords: &[&str]) -> RuleConfig {
    RuleConfig {
        backend: backend.into(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

/// Coding first, then insights, payments, cache and repositories.
pub fn default_rules() -> Vec<RuleConfig> {
    vec![
        rule(
            "kate",
            &["code", "debug", "function", "class", "bug", "optimize code"],
        ),
        rule(
            "grok",
            &["analyze", "insight", "automate", "optimize listing", "marketplace"],
        ),
        rule("stripe", &["payment", "stripe", "charge", "refund"]),
        rule("redis", &["cache", "redis", "session", "store"]),
        rule("github", &["github", "repo", "repository", "commit"]),
    ]
}

fn subprocess(name: &str, description: &str, script: &str, default_operation: &str) -> AgentDescriptor {
    AgentDescriptor {
        name: name.into(),
        enabled: true,
        description: description.into(),
        kind: BackendKind::Subprocess(SubprocessBackend {
            command: ServerCommand::new(script, vec![]),
            default_operation: default_operation.into(),
            operations: Vec::new(),
        }),
    }
}

fn hosted(name: &str, description: &str, model: &str, system_prompt: &str) -> AgentDescriptor {
    AgentDescriptor {
        name: name.into(),
        enabled: true,
        description: description.into(),
        kind: BackendKind::Hosted(HostedBackend {
            llm: LlmConfig::new(model, system_prompt),
            require_api_key: true,
        }),
    }
}

pub fn default_backends() -> Vec<AgentDescriptor> {
    vec![
        subprocess(
            "stripe",
            "Payment operations",
            "./subagents/stripe-agent.sh",
            "list_products",
        ),
        subprocess(
            "redis",
            "Cache and session storage",
            "./subagents/redis-agent.sh",
            "get",
        ),
        subprocess(
            "github",
            "Repository operations",
            "./subagents/github-agent.sh",
            "search_repositories",
        ),
        hosted(
            "kate",
            "Coding specialist",
            "kat-coder-pro:free",
            "You are KATE, the code specialist of the marketplace. Write production-ready code and debug with precision.",
        ),
        hosted(
            "grok",
            "Fast insights and automation",
            "x-ai/grok-2-1212:free",
            "You are Grok, a fast-thinking strategist. Provide quick insights and automate marketplace operations.",
        ),
        hosted(
            "jules",
            "Planner and orchestrator",
            "mistralai/devstral-2512",
            "You are Jules, the orchestrator. You pick exactly one operation for a backend and answer with JSON only.",
        ),
    ]
}
