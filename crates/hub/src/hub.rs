//! The tool hub.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::{Value, json};
use switchboard_common::events::names;
use switchboard_common::{Observer, Result, SwitchboardError};
use switchboard_mcp::ToolInfo;
use tracing::{debug, error, info, warn};

use crate::automation_log::{AutomationLog, AutomationLogRow, NoopAutomationLog};
use crate::bridge::{RemoteBridge, split_qualified};
use crate::tool::{ToolDescriptor, ToolSummary};
use crate::workflow::{
    StepResult, WorkflowDescriptor, WorkflowExecution, WorkflowStatus, carry_forward, initial_args,
};

/// Registry of local tools and workflows, optionally bridged to external MCP
/// servers.
///
/// Registration takes `&self` so tools can be added while the hub is shared.
pub struct ToolHub {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    workflows: RwLock<HashMap<String, WorkflowDescriptor>>,
    bridge: Option<RemoteBridge>,
    automation_log: Arc<dyn AutomationLog>,
    log_timeout: Duration,
    observer: Observer,
}

pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(10);

impl ToolHub {
    pub fn new(observer: Observer) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            workflows: RwLock::new(HashMap::new()),
            bridge: None,
            automation_log: Arc::new(NoopAutomationLog),
            log_timeout: DEFAULT_LOG_TIMEOUT,
            observer: observer.scoped("hub"),
        }
    }

    /// Route qualified tool names through `bridge`.
    pub fn with_bridge(mut self, bridge: RemoteBridge) -> Self {
        info!(servers = ?bridge.servers(), "MCP bridge enabled");
        self.bridge = Some(bridge);
        self
    }

    pub fn with_automation_log(mut self, log: Arc<dyn AutomationLog>) -> Self {
        self.automation_log = log;
        self
    }

    /// Upper bound on one automation log write.
    pub fn with_log_timeout(mut self, timeout: Duration) -> Self {
        self.log_timeout = timeout;
        self
    }

    pub fn bridge(&self) -> Option<&RemoteBridge> {
        self.bridge.as_ref()
    }

    pub fn register_tool(&self, tool: ToolDescriptor) {
        info!(tool = %tool.name, category = %tool.category, "Registered tool");
        if let Some(previous) = self.tools.write().insert(tool.name.clone(), tool) {
            debug!(tool = %previous.name, "Replaced existing tool");
        }
    }

    pub fn register_workflow(&self, workflow: WorkflowDescriptor) {
        info!(workflow = %workflow.id, steps = workflow.steps.len(), "Registered workflow");
        if let Some(previous) = self.workflows.write().insert(workflow.id.clone(), workflow) {
            debug!(workflow = %previous.id, "Replaced existing workflow");
        }
    }

    /// Local tools, sorted by name.
    pub fn tools(&self) -> Vec<ToolSummary> {
        let mut tools: Vec<ToolSummary> = self.tools.read().values().map(|t| t.summary()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Workflows, sorted by id.
    pub fn workflows(&self) -> Vec<WorkflowDescriptor> {
        let mut workflows: Vec<WorkflowDescriptor> = self.workflows.read().values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    /// Execute a tool by name.
    ///
    /// With a bridge, `server/tool` and `server:tool` go to the external
    /// server. Everything else is looked up locally.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        let started = Instant::now();
        self.observer.info(names::TOOL_STARTED, json!({ "tool": name }));

        let result = self.invoke(name, args).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                debug!(tool = %name, duration_ms, "Tool succeeded");
                self.observer.info(
                    names::TOOL_SUCCEEDED,
                    json!({ "tool": name, "duration_ms": duration_ms }),
                );
            }
            Err(e) => {
                warn!(tool = %name, duration_ms, error = %e, "Tool failed");
                self.observer.error(
                    names::TOOL_FAILED,
                    json!({ "tool": name, "duration_ms": duration_ms, "error": e.to_string() }),
                );
            }
        }
        result
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        if let Some(bridge) = &self.bridge
            && let Some((server, tool)) = split_qualified(name)
        {
            return bridge.call(server, tool, args).await;
        }

        let tool = self
            .tools
            .read()
            .get(name)
            .map(|t| t.tool.clone())
            .ok_or_else(|| SwitchboardError::ToolNotFound(name.to_string()))?;

        tool.execute(args).await
    }

    /// Run a workflow's steps in order, stopping at the first failure.
    pub async fn run_workflow(&self, id: &str, args: Value) -> Result<WorkflowExecution> {
        let workflow = self
            .workflows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SwitchboardError::WorkflowNotFound(id.to_string()))?;

        let started = Instant::now();
        info!(workflow = %workflow.id, steps = workflow.steps.len(), "Starting workflow");
        self.observer.info(
            names::WORKFLOW_STARTED,
            json!({ "workflow_id": workflow.id, "name": workflow.name, "steps": workflow.steps }),
        );

        let mut current = initial_args(args);
        let mut step_results = Vec::with_capacity(workflow.steps.len());
        let mut status = WorkflowStatus::Completed;

        for (i, step) in workflow.steps.iter().enumerate() {
            let step_started = Instant::now();
            debug!(workflow = %workflow.id, step = i + 1, tool = %step, "Executing workflow step");

            match self.call_tool(step, current.clone()).await {
                Ok(result) => {
                    let duration_ms = step_started.elapsed().as_millis() as u64;
                    step_results.push(StepResult::success(step, result.clone(), duration_ms));
                    current = carry_forward(current, result);
                }
                Err(e) => {
                    let duration_ms = step_started.elapsed().as_millis() as u64;
                    error!(workflow = %workflow.id, step = %step, error = %e, "Workflow step failed");
                    self.observer.error(
                        names::WORKFLOW_STEP_FAILED,
                        json!({
                            "workflow_id": workflow.id,
                            "step": step,
                            "index": i,
                            "error": e.to_string(),
                        }),
                    );
                    step_results.push(StepResult::failed(step, e.to_string(), duration_ms));
                    status = WorkflowStatus::Failed;
                    break;
                }
            }
        }

        let execution = WorkflowExecution {
            workflow_id: workflow.id,
            workflow_name: workflow.name,
            step_results,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            workflow = %execution.workflow_id,
            status = ?execution.status,
            steps = execution.step_results.len(),
            duration_ms = execution.duration_ms,
            "Workflow finished"
        );
        self.observer.info(
            names::WORKFLOW_COMPLETED,
            json!({
                "workflow_id": execution.workflow_id,
                "status": execution.status,
                "steps": execution.step_results.len(),
                "duration_ms": execution.duration_ms,
            }),
        );

        let row = AutomationLogRow::from_execution(&execution);
        match tokio::time::timeout(self.log_timeout, self.automation_log.record(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(workflow = %execution.workflow_id, error = %e, "Failed to write automation log");
            }
            Err(_) => {
                warn!(
                    workflow = %execution.workflow_id,
                    timeout_ms = self.log_timeout.as_millis() as u64,
                    "Automation log write timed out"
                );
            }
        }

        Ok(execution)
    }

    pub async fn list_remote_tools(&self, server: &str, force_refresh: bool) -> Result<Vec<ToolInfo>> {
        match &self.bridge {
            Some(bridge) => bridge.list_remote_tools(server, force_refresh).await,
            None => Err(SwitchboardError::UnknownServer(server.to_string())),
        }
    }

    pub async fn refresh_remote_tools(&self) -> BTreeMap<String, usize> {
        let Some(bridge) = &self.bridge else {
            return BTreeMap::new();
        };
        let counts = bridge.refresh_remote_tools().await;
        self.observer
            .info(names::REMOTE_TOOLS_REFRESHED, json!({ "servers": counts }));
        counts
    }

    pub async fn remote_tools_summary(&self) -> Vec<ToolSummary> {
        match &self.bridge {
            Some(bridge) => bridge.remote_tools_summary().await,
            None => Vec::new(),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(bridge) = &self.bridge {
            info!("Closing bridged MCP clients");
            bridge.shutdown().await;
        }
    }
}
