//! Composition root: builds the router, the hub and the event pipeline from
//! one [`SwitchboardConfig`].

use std::sync::Arc;

use anyhow::Context;
use switchboard_common::{EventSink, JsonlSink, Observer, TracingSink};
use switchboard_hub::{
    MarketplaceAgents, RemoteBridge, RestAutomationLog, ToolHub, ToolsConfig, default_tools,
    default_workflows, notify_tool,
};
use switchboard_llm::HostedAgent;
use switchboard_router::{Backend, TaskRouter};
use tracing::{info, warn};

use crate::config::{ObservabilityConfig, SwitchboardConfig};

pub struct Orchestrator {
    pub router: TaskRouter,
    pub hub: ToolHub,
    observer: Observer,
}

impl Orchestrator {
    pub fn new(router: TaskRouter, hub: ToolHub, observer: Observer) -> Self {
        Self {
            router,
            hub,
            observer,
        }
    }

    /// Build everything from configuration. Must run inside a Tokio runtime.
    pub async fn from_config(config: &SwitchboardConfig) -> anyhow::Result<Self> {
        let observer = build_observer(&config.observability);
        let router = TaskRouter::from_config(&config.router, observer.clone());

        let mut hub = ToolHub::new(observer.clone());
        if config.hub.bridge_enabled {
            let bridge = RemoteBridge::from_config(&config.hub).await.with_context(|| {
                format!(
                    "Failed to load MCP servers from '{}'",
                    config.hub.mcp_config_path.display()
                )
            })?;
            hub = hub.with_bridge(bridge);
        }

        if let Some(ref url) = config.log_sink.url {
            info!(url = %url, "Automation log sink enabled");
            let log = RestAutomationLog::new(
                url.clone(),
                config.log_sink.resolve_api_key(),
                config.log_sink.timeout(),
            )
            .context("Failed to build automation log client")?;
            hub = hub
                .with_automation_log(Arc::new(log))
                .with_log_timeout(config.log_sink.timeout());
        }

        register_marketplace(&hub, &router, &config.tools);

        Ok(Self::new(router, hub, observer))
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Close every connection and drain pending events.
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
        self.hub.shutdown().await;
        self.observer.flush().await;
        info!("Orchestrator shut down");
    }
}

fn build_observer(config: &ObservabilityConfig) -> Observer {
    if !config.enabled {
        return Observer::disabled();
    }

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(ref path) = config.jsonl_path {
        let sink = JsonlSink::new(path);
        info!(path = %path.display(), run_id = %sink.run_id(), "Writing orchestration events");
        sinks.push(Arc::new(sink));
    }
    Observer::spawn(sinks, config.queue_capacity)
}

/// Register the default marketplace tools and workflows on `hub`.
///
/// Prompt tools run on the router's hosted backends named in `tools`. When
/// either is missing only the notification webhook is registered.
pub fn register_marketplace(hub: &ToolHub, router: &TaskRouter, tools: &ToolsConfig) {
    let hosted = |name: &str| -> Option<Arc<HostedAgent>> {
        match router.backend(name) {
            Some(Backend::Hosted { agent }) => Some(agent.clone()),
            _ => None,
        }
    };

    match (hosted(&tools.analyst), hosted(&tools.writer)) {
        (Some(analyst), Some(writer)) => {
            let agents = MarketplaceAgents { analyst, writer };
            for tool in default_tools(&agents, tools) {
                hub.register_tool(tool);
            }
        }
        _ => {
            warn!(
                analyst = %tools.analyst,
                writer = %tools.writer,
                "Hosted backends for marketplace tools not registered, prompt tools disabled"
            );
            hub.register_tool(notify_tool(tools));
        }
    }

    for workflow in default_workflows() {
        hub.register_workflow(workflow);
    }
}
