//! The task router.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value, json};
use switchboard_common::events::names;
use switchboard_common::{Observer, Result, SwitchboardError};
use switchboard_llm::{AgentOutcome, ExecuteOptions, HostedAgent, build_hosted_agent};
use switchboard_mcp::{
    ClientTimeouts, DefaultClassifier, Launcher, ProtocolClient, StdioLauncher, ToolEnvelope,
    ToolInfo,
};
use tracing::{debug, info, warn};

use crate::config::{AgentDescriptor, BackendKind, OperationSpec, RouterConfig};
use crate::planner::OperationPlanner;
use crate::retry::RetryConfig;
use crate::routing::{RouteDecision, RuleSet};

/// A registered backend.
pub enum Backend {
    Subprocess {
        client: Arc<ProtocolClient>,
        default_operation: String,
        operations: Vec<OperationSpec>,
    },
    Hosted {
        agent: Arc<HostedAgent>,
    },
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Subprocess { .. } => "subprocess",
            Backend::Hosted { .. } => "hosted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchResult {
    /// Result of a subprocess tool call. `payload` is the decoded envelope text.
    Tool {
        operation: String,
        payload: Value,
        envelope: ToolEnvelope,
    },
    /// Result of a hosted model call, successful or not.
    Completion { outcome: AgentOutcome },
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub dispatch_id: String,
    pub backend: String,
    pub matched: String,
    pub duration_ms: u64,
    pub result: DispatchResult,
}

impl DispatchOutcome {
    /// False only for hosted outcomes that report a failure.
    pub fn succeeded(&self) -> bool {
        match &self.result {
            DispatchResult::Tool { .. } => true,
            DispatchResult::Completion { outcome } => outcome.success,
        }
    }
}

/// Routes free-text tasks to registered backends.
///
/// The registry is only mutated through `&mut self` while the router is being
/// assembled; once shared it is read-only.
pub struct TaskRouter {
    backends: HashMap<String, Backend>,
    rules: RuleSet,
    planner: Option<String>,
    retry: RetryConfig,
    surface_application_errors: bool,
    error_markers: Vec<String>,
    timeouts: ClientTimeouts,
    observer: Observer,
}

impl TaskRouter {
    pub fn new(rules: RuleSet, observer: Observer) -> Self {
        info!(rules = rules.rules().len(), "Creating task router");
        Self {
            backends: HashMap::new(),
            rules,
            planner: None,
            retry: RetryConfig::disabled(),
            surface_application_errors: true,
            error_markers: Vec::new(),
            timeouts: ClientTimeouts::default(),
            observer: observer.scoped("router"),
        }
    }

    pub fn from_config(config: &RouterConfig, observer: Observer) -> Self {
        Self::from_config_with_launcher(config, Arc::new(StdioLauncher), observer)
    }

    pub fn from_config_with_launcher(
        config: &RouterConfig,
        launcher: Arc<dyn Launcher>,
        observer: Observer,
    ) -> Self {
        let mut router = Self::new(RuleSet::from_config(&config.rules), observer)
            .with_planner(config.planner.clone())
            .with_retry(config.retry.clone())
            .with_application_errors(config.surface_application_errors, config.error_markers.clone())
            .with_timeouts(config.timeouts);

        for descriptor in &config.backends {
            router.register(descriptor, launcher.clone());
        }

        info!(
            backends = ?router.backend_names(),
            planner = ?router.planner,
            "Task router ready"
        );
        router
    }

    /// Name of the hosted backend used for operation planning. Empty disables it.
    pub fn with_planner(mut self, planner: Option<String>) -> Self {
        self.planner = planner
            .map(|p| p.to_lowercase())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_application_errors(mut self, surface: bool, extra_markers: Vec<String>) -> Self {
        self.surface_application_errors = surface;
        self.error_markers = extra_markers;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Register a backend from its descriptor.
    ///
    /// Disabled descriptors, and hosted ones whose API key cannot be
    /// resolved, are skipped. Returns whether the backend was registered.
    pub fn register(&mut self, descriptor: &AgentDescriptor, launcher: Arc<dyn Launcher>) -> bool {
        if !descriptor.enabled {
            info!(backend = %descriptor.name, "Skipping backend (disabled)");
            return false;
        }

        let key = descriptor.name.to_lowercase();
        match &descriptor.kind {
            BackendKind::Subprocess(sub) => {
                let mut markers = vec!["error:".to_string()];
                markers.extend(self.error_markers.iter().cloned());

                let client = ProtocolClient::with_launcher(&key, sub.command.clone(), launcher)
                    .with_timeouts(self.timeouts)
                    .with_classifier(Arc::new(DefaultClassifier::new(markers)));

                self.register_subprocess(
                    &key,
                    Arc::new(client),
                    sub.default_operation.clone(),
                    sub.operations.clone(),
                );
            }
            BackendKind::Hosted(hosted) => {
                if hosted.require_api_key && hosted.llm.resolve_api_key().is_none() {
                    info!(
                        backend = %descriptor.name,
                        env = %hosted.llm.api_key_env,
                        "Skipping backend (no API key)"
                    );
                    return false;
                }
                self.register_hosted(&key, Arc::new(build_hosted_agent(&key, &hosted.llm)));
            }
        }
        true
    }

    pub fn register_subprocess(
        &mut self,
        name: &str,
        client: Arc<ProtocolClient>,
        default_operation: String,
        operations: Vec<OperationSpec>,
    ) {
        info!(backend = %name, command = %client.command().command, "Registered subprocess backend");
        self.insert(
            name,
            Backend::Subprocess {
                client,
                default_operation,
                operations,
            },
        );
    }

    pub fn register_hosted(&mut self, name: &str, agent: Arc<HostedAgent>) {
        info!(backend = %name, model = %agent.model(), "Registered hosted backend");
        self.insert(name, Backend::Hosted { agent });
    }

    fn insert(&mut self, name: &str, backend: Backend) {
        if self.backends.insert(name.to_lowercase(), backend).is_some() {
            warn!(backend = %name, "Backend re-registered, previous entry replaced");
        }
    }

    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.backends.get(&name.to_lowercase())
    }

    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Pure classification, without dispatching.
    pub fn classify(&self, text: &str) -> Option<RouteDecision> {
        self.rules.classify(text)
    }

    /// Route a task to a backend and run it.
    ///
    /// `operation` and `args` only apply to subprocess backends. Hosted
    /// backends receive the task text as the prompt.
    pub async fn dispatch(
        &self,
        text: &str,
        operation: Option<&str>,
        args: Option<Value>,
    ) -> Result<DispatchOutcome> {
        let dispatch_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();

        self.observer.info(
            names::DISPATCH_STARTED,
            json!({
                "dispatch_id": dispatch_id,
                "task": text.chars().take(120).collect::<String>(),
                "operation": operation,
            }),
        );

        let result = self.dispatch_inner(&dispatch_id, text, operation, args).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((decision, result)) => {
                let outcome = DispatchOutcome {
                    dispatch_id,
                    backend: decision.backend,
                    matched: decision.matched,
                    duration_ms,
                    result,
                };
                self.observer.info(
                    names::DISPATCH_COMPLETED,
                    json!({
                        "dispatch_id": outcome.dispatch_id,
                        "backend": outcome.backend,
                        "success": outcome.succeeded(),
                        "duration_ms": duration_ms,
                    }),
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(dispatch_id = %dispatch_id, error = %e, "Dispatch failed");
                self.observer.error(
                    names::DISPATCH_FAILED,
                    json!({
                        "dispatch_id": dispatch_id,
                        "error": e.to_string(),
                        "duration_ms": duration_ms,
                    }),
                );
                Err(e)
            }
        }
    }

    async fn dispatch_inner(
        &self,
        dispatch_id: &str,
        text: &str,
        operation: Option<&str>,
        args: Option<Value>,
    ) -> Result<(RouteDecision, DispatchResult)> {
        let Some(decision) = self.rules.classify(text) else {
            debug!(dispatch_id = %dispatch_id, "No routing rule matched");
            self.observer.warning(
                names::DISPATCH_ROUTED,
                json!({
                    "dispatch_id": dispatch_id,
                    "backend": Value::Null,
                    "matched": Value::Null,
                }),
            );
            return Err(SwitchboardError::NoSuitableAgent);
        };

        info!(
            dispatch_id = %dispatch_id,
            backend = %decision.backend,
            matched = %decision.matched,
            "Routing task"
        );
        self.observer.info(
            names::DISPATCH_ROUTED,
            json!({
                "dispatch_id": dispatch_id,
                "backend": decision.backend,
                "matched": decision.matched,
            }),
        );

        let backend = self
            .backends
            .get(&decision.backend)
            .ok_or_else(|| SwitchboardError::AgentNotFound(decision.backend.clone()))?;

        let result = match backend {
            Backend::Subprocess {
                client,
                default_operation,
                operations,
            } => {
                let (op, args) = self
                    .resolve_operation(
                        &decision.backend,
                        client,
                        default_operation,
                        operations,
                        text,
                        operation,
                        args,
                    )
                    .await;

                let envelope = if self.surface_application_errors {
                    client.call_tool_checked(&op, args).await?
                } else {
                    client.call_tool(&op, args).await?
                };

                DispatchResult::Tool {
                    payload: envelope.decode_payload(),
                    operation: op,
                    envelope,
                }
            }
            Backend::Hosted { agent } => {
                if operation.is_some() || args.is_some() {
                    debug!(backend = %decision.backend, "Ignoring operation and args for hosted backend");
                }
                let outcome = self
                    .execute_hosted(agent, text, ExecuteOptions::default())
                    .await;
                DispatchResult::Completion { outcome }
            }
        };

        Ok((decision, result))
    }

    /// Explicit operation, else the planner's choice, else the default.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_operation(
        &self,
        backend: &str,
        client: &ProtocolClient,
        default_operation: &str,
        operations: &[OperationSpec],
        text: &str,
        operation: Option<&str>,
        args: Option<Value>,
    ) -> (String, Value) {
        let caller_args = args.unwrap_or_else(|| json!({}));

        if let Some(op) = operation {
            return (op.to_string(), caller_args);
        }

        let Some(planner) = self.planner() else {
            return (default_operation.to_string(), caller_args);
        };

        let menu: Vec<OperationSpec> = if operations.is_empty() {
            match client.list_tools().await {
                Ok(tools) => tools.iter().map(OperationSpec::from).collect(),
                Err(e) => {
                    warn!(backend = %backend, error = %e, "Could not list tools for planning");
                    Vec::new()
                }
            }
        } else {
            operations.to_vec()
        };

        match planner.plan(backend, text, &menu).await {
            Ok(planned) => {
                let mut args = planned.args;
                if let (Value::Object(planned_args), Value::Object(explicit)) =
                    (&mut args, caller_args)
                {
                    planned_args.extend(explicit);
                }
                (planned.operation_name, args)
            }
            Err(e) => {
                warn!(
                    backend = %backend,
                    planner = %planner.agent_name(),
                    fallback = %default_operation,
                    error = %e,
                    "Planning failed, using default operation"
                );
                (default_operation.to_string(), caller_args)
            }
        }
    }

    fn planner(&self) -> Option<OperationPlanner> {
        let name = self.planner.as_ref()?;
        match self.backends.get(name) {
            Some(Backend::Hosted { agent }) => Some(OperationPlanner::new(agent.clone())),
            _ => {
                debug!(planner = %name, "Planner backend not registered");
                None
            }
        }
    }

    async fn execute_hosted(
        &self,
        agent: &HostedAgent,
        prompt: &str,
        options: ExecuteOptions,
    ) -> AgentOutcome {
        let mut attempt = 0;
        loop {
            let outcome = agent.execute(prompt, options.clone()).await;
            let retryable = outcome
                .error
                .as_deref()
                .is_some_and(RetryConfig::is_retryable);

            if outcome.success || !retryable || attempt >= self.retry.max_retries {
                return outcome;
            }

            let delay = self.retry.delay_ms(attempt);
            warn!(
                agent = %agent.name(),
                attempt = attempt + 1,
                max_retries = self.retry.max_retries,
                delay_ms = delay,
                error = ?outcome.error,
                "Retrying hosted backend"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Call a tool on a named subprocess backend, bypassing classification.
    pub async fn call_tool(&self, backend: &str, tool: &str, args: Value) -> Result<ToolEnvelope> {
        let client = self.subprocess(backend)?;
        match client.call_tool(tool, args).await {
            Ok(envelope) => {
                info!(backend = %backend, tool = %tool, "Tool executed");
                Ok(envelope)
            }
            Err(e) => {
                warn!(backend = %backend, tool = %tool, error = %e, "Tool call failed");
                Err(e)
            }
        }
    }

    pub async fn list_tools(&self, backend: &str) -> Result<Vec<ToolInfo>> {
        self.subprocess(backend)?.list_tools().await
    }

    /// Call a named hosted backend directly.
    pub async fn call_hosted(
        &self,
        backend: &str,
        prompt: &str,
        options: ExecuteOptions,
    ) -> Result<AgentOutcome> {
        match self.backends.get(&backend.to_lowercase()) {
            Some(Backend::Hosted { agent }) => Ok(self.execute_hosted(agent, prompt, options).await),
            _ => Err(SwitchboardError::AgentNotFound(backend.to_string())),
        }
    }

    /// Connect one subprocess backend, reporting success.
    pub async fn connect(&self, backend: &str) -> bool {
        match self.subprocess(backend) {
            Ok(client) => match client.connect().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(backend = %backend, error = %e, "Failed to connect");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "Cannot connect");
                false
            }
        }
    }

    fn subprocess(&self, backend: &str) -> Result<&Arc<ProtocolClient>> {
        match self.backends.get(&backend.to_lowercase()) {
            Some(Backend::Subprocess { client, .. }) => Ok(client),
            _ => Err(SwitchboardError::AgentNotFound(backend.to_string())),
        }
    }

    /// Probe every backend concurrently. One backend's failure never affects
    /// another's result.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let probes = self.backends.iter().map(|(name, backend)| async move {
            let healthy = match backend {
                Backend::Subprocess { client, .. } => match client.connect().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(backend = %name, error = %e, "Health probe failed");
                        false
                    }
                },
                Backend::Hosted { agent } => agent.ping().await,
            };
            (name.clone(), healthy)
        });

        let status: BTreeMap<String, bool> = futures::future::join_all(probes)
            .await
            .into_iter()
            .collect();

        self.observer.info(names::HEALTH_CHECKED, json!({ "status": status }));
        status
    }

    /// Close every subprocess connection. Failures are logged and skipped.
    pub async fn shutdown(&self) {
        info!("Shutting down all backends");
        for (name, backend) in &self.backends {
            if let Backend::Subprocess { client, .. } = backend {
                match client.close().await {
                    Ok(()) => debug!(backend = %name, "Disconnected"),
                    Err(e) => warn!(backend = %name, error = %e, "Failed to disconnect"),
                }
            }
        }
    }
}
