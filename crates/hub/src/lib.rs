//! Tool hub for Switchboard.
//!
//! The hub keeps two registries, local tools and workflows, and can bridge
//! `server/tool` names to external MCP servers listed in an `mcpServers`
//! JSON file. Workflows run their steps in order and stop at the first
//! failure; every run writes one summary row to the automation log.

pub mod automation_log;
pub mod bridge;
pub mod builtin;
pub mod config;
pub mod hub;
pub mod marketplace;
pub mod tool;
pub mod workflow;

pub use automation_log::{AutomationLog, AutomationLogRow, NoopAutomationLog, RestAutomationLog};
pub use bridge::{RemoteBridge, parse_servers, split_qualified};
pub use builtin::{PromptTool, WebhookTool};
pub use config::HubConfig;
pub use hub::{DEFAULT_LOG_TIMEOUT, ToolHub};
pub use marketplace::{MarketplaceAgents, ToolsConfig, default_tools, default_workflows, notify_tool};
pub use tool::{LocalTool, ToolCategory, ToolDescriptor, ToolSummary};
pub use workflow::{
    CARRY_KEY, StepResult, StepStatus, WorkflowDescriptor, WorkflowExecution, WorkflowStatus,
};
