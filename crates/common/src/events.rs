//! Orchestration events and the background emitter that delivers them.
//!
//! Components hold a cheap, cloneable [`Observer`] and call [`Observer::emit`]
//! on the hot path. Events go into a bounded queue drained by a single worker
//! task which fans them out to every configured [`EventSink`]. Emission never
//! blocks and never fails: when the queue is full the event is dropped with a
//! warning.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Well-known event names.
pub mod names {
    pub const DISPATCH_STARTED: &str = "dispatch.started";
    pub const DISPATCH_ROUTED: &str = "dispatch.routed";
    pub const DISPATCH_COMPLETED: &str = "dispatch.completed";
    pub const DISPATCH_FAILED: &str = "dispatch.failed";
    pub const TOOL_STARTED: &str = "tool.started";
    pub const TOOL_SUCCEEDED: &str = "tool.succeeded";
    pub const TOOL_FAILED: &str = "tool.failed";
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_STEP_FAILED: &str = "workflow.step_failed";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const HEALTH_CHECKED: &str = "health.checked";
    pub const REMOTE_TOOLS_REFRESHED: &str = "remote_tools.refreshed";
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub fn unix_ms_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    pub name: String,
    /// Component that emitted the event, e.g. `router` or `hub`.
    pub source: String,
    pub severity: Severity,
    pub payload: Value,
    pub ts_unix_ms: u128,
}

/// Destination for orchestration events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &OrchestrationEvent);
}

enum Envelope {
    Event(OrchestrationEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle used by components to report orchestration events.
#[derive(Clone)]
pub struct Observer {
    tx: Option<mpsc::Sender<Envelope>>,
    source: Arc<str>,
}

impl Observer {
    /// Start the delivery worker and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime. The worker exits once
    /// every clone of the returned handle has been dropped.
    pub fn spawn(sinks: Vec<Arc<dyn EventSink>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Event(event) => {
                        for sink in &sinks {
                            sink.record(&event).await;
                        }
                    }
                    Envelope::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Event worker stopped");
        });

        Self {
            tx: Some(tx),
            source: Arc::from("switchboard"),
        }
    }

    /// An observer that discards everything.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            source: Arc::from("switchboard"),
        }
    }

    /// A handle sharing the same worker but tagging events with `source`.
    pub fn scoped(&self, source: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            source: Arc::from(source),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, name: &str, severity: Severity, payload: Value) {
        let Some(tx) = &self.tx else {
            return;
        };

        let event = OrchestrationEvent {
            name: name.to_string(),
            source: self.source.to_string(),
            severity,
            payload,
            ts_unix_ms: unix_ms_now(),
        };

        match tx.try_send(Envelope::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = name, "Event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(event = name, "Event worker gone, dropping event");
            }
        }
    }

    pub fn info(&self, name: &str, payload: Value) {
        self.emit(name, Severity::Info, payload);
    }

    pub fn warning(&self, name: &str, payload: Value) {
        self.emit(name, Severity::Warning, payload);
    }

    pub fn error(&self, name: &str, payload: Value) {
        self.emit(name, Severity::Error, payload);
    }

    /// Wait until every event emitted before this call has been delivered.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Envelope::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Writes events to the `tracing` subscriber.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn record(&self, event: &OrchestrationEvent) {
        match event.severity {
            Severity::Info => {
                info!(event = %event.name, source = %event.source, payload = %event.payload, "orchestration event")
            }
            Severity::Warning => {
                warn!(event = %event.name, source = %event.source, payload = %event.payload, "orchestration event")
            }
            Severity::Error => {
                error!(event = %event.name, source = %event.source, payload = %event.payload, "orchestration event")
            }
        }
    }
}

/// Appends one JSON object per event to a file.
pub struct JsonlSink {
    path: PathBuf,
    run_id: String,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn to_line(&self, event: &OrchestrationEvent) -> String {
        let mut record = serde_json::Map::new();
        record.insert("ts_unix_ms".to_string(), json!(event.ts_unix_ms));
        record.insert("event".to_string(), json!(event.name));
        record.insert("source".to_string(), json!(event.source));
        record.insert("severity".to_string(), json!(event.severity));
        record.insert("run_id".to_string(), json!(self.run_id));

        if let Some(map) = event.payload.as_object() {
            for (key, value) in map {
                record.insert(key.clone(), value.clone());
            }
        } else if !event.payload.is_null() {
            record.insert("payload".to_string(), event.payload.clone());
        }

        let mut line = Value::Object(record).to_string();
        line.push('\n');
        line
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl EventSink for JsonlSink {
    async fn record(&self, event: &OrchestrationEvent) {
        let line = self.to_line(event);
        if let Err(err) = self.append(&line).await {
            warn!(
                event = %event.name,
                path = %self.path.display(),
                error = %err,
                "Event log write failed"
            );
        }
    }
}

/// Keeps events in memory. Useful for tests and diagnostics.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<OrchestrationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record(&self, event: &OrchestrationEvent) {
        self.events.lock().push(event.clone());
    }
}
