//! Switchboard command-line binary.
//!
//! Usage:
//!   switchboard dispatch "refund order 42"
//!   switchboard dispatch "read session" --operation get --args '{"key":"s1"}'
//!   switchboard workflow list
//!   switchboard workflow run listing_boost_masterpiece --args '{"text":"lamp"}'
//!   switchboard tools --remote --refresh
//!   switchboard health
//!
//! # Environment Variables
//!
//! - `OPENROUTER_API_KEY` - key for hosted backends (default `api_key_env`)
//! - `SWITCHBOARD_BRIDGE_ENABLED` - route `server/tool` names to MCP servers
//! - `SWITCHBOARD_MCP_CONFIG` - path of the `mcpServers` JSON file
//! - `RUST_LOG` - log filter (default `info,switchboard=debug`)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use switchboard::{Orchestrator, SwitchboardConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Route tasks to MCP agents and hosted models, and run tool workflows.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about)]
struct Cli {
    /// Config file path. Built-in defaults are used when omitted.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a task and send it to the matching backend.
    Dispatch {
        text: String,
        /// Operation to call on a subprocess backend, skipping the planner.
        #[arg(long)]
        operation: Option<String>,
        /// JSON arguments for the operation.
        #[arg(long)]
        args: Option<String>,
    },
    /// List or run workflows.
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// List local tools, and remote tools with --remote.
    Tools {
        #[arg(long)]
        remote: bool,
        /// Ignore cached remote listings.
        #[arg(long)]
        refresh: bool,
    },
    /// Probe every backend.
    Health,
}

#[derive(Subcommand, Debug)]
enum WorkflowAction {
    List,
    Run {
        id: String,
        #[arg(long)]
        args: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,switchboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => SwitchboardConfig::from_file(path)?,
        None => SwitchboardConfig::from_env()?,
    };

    let orchestrator = Orchestrator::from_config(&config).await?;
    info!(backends = ?orchestrator.router.backend_names(), "Switchboard ready");

    let result = run(&orchestrator, cli.command).await;
    orchestrator.shutdown().await;
    result
}

async fn run(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Dispatch {
            text,
            operation,
            args,
        } => {
            let args = parse_args(args.as_deref())?;
            let outcome = orchestrator
                .router
                .dispatch(&text, operation.as_deref(), args)
                .await?;
            print_json(&outcome)
        }
        Command::Workflow { action } => match action {
            WorkflowAction::List => print_json(&orchestrator.hub.workflows()),
            WorkflowAction::Run { id, args } => {
                let args = parse_args(args.as_deref())?.unwrap_or(Value::Null);
                let execution = orchestrator.hub.run_workflow(&id, args).await?;
                print_json(&execution)
            }
        },
        Command::Tools { remote, refresh } => {
            let local = orchestrator.hub.tools();
            if !remote {
                return print_json(&local);
            }
            if refresh {
                orchestrator.hub.refresh_remote_tools().await;
            }
            let remote = orchestrator.hub.remote_tools_summary().await;
            print_json(&json!({ "local": local, "remote": remote }))
        }
        Command::Health => print_json(&orchestrator.router.health_check().await),
    }
}

fn parse_args(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("--args is not valid JSON: {s}")))
        .transpose()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
