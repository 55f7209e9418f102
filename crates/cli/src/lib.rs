//! Switchboard: routes free-text tasks to MCP subprocess agents and hosted
//! models, and runs sequential tool workflows.
//!
//! The binary builds one [`Orchestrator`] from a TOML file and drives it from
//! the command line.

pub mod config;
pub mod orchestrator;

pub use config::{LogSinkConfig, ObservabilityConfig, SwitchboardConfig};
pub use orchestrator::{Orchestrator, register_marketplace};
