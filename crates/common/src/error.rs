//! Error types for Switchboard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("Connection to '{server}' failed: {reason}")]
    Connection { server: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool call '{tool}' failed: {cause}")]
    ToolCall { tool: String, cause: String },

    #[error("Tool '{tool}' reported an error: {message}")]
    Application { tool: String, message: String },

    #[error("No suitable agent for task")]
    NoSuitableAgent,

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Unknown MCP server: {0}")]
    UnknownServer(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SwitchboardError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn connection(server: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    pub fn tool_call(tool: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            cause: cause.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: after.as_millis() as u64,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
