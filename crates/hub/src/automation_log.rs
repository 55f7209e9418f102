//! Summary rows for the automation log table.
//!
//! Every workflow run writes one row. Sinks may fail; the hub logs the
//! failure and keeps the execution result.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_common::{Result, SwitchboardError};
use tracing::debug;

use crate::workflow::WorkflowExecution;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLogRow {
    pub automation_name: String,
    pub status: String,
    pub records_processed: usize,
    pub records_succeeded: usize,
    pub records_failed: usize,
    pub execution_duration_ms: u64,
    /// Step results of a failed run; null when every step succeeded.
    pub error_details: Value,
}

impl AutomationLogRow {
    pub fn from_execution(execution: &WorkflowExecution) -> Self {
        Self {
            automation_name: format!("Workflow: {}", execution.workflow_name),
            status: if execution.is_completed() { "success" } else { "failed" }.to_string(),
            records_processed: execution.step_results.len(),
            records_succeeded: execution.succeeded_steps(),
            records_failed: execution.failed_steps(),
            execution_duration_ms: execution.duration_ms,
            error_details: if execution.is_completed() {
                Value::Null
            } else {
                json!({ "results": execution.step_results })
            },
        }
    }
}

#[async_trait]
pub trait AutomationLog: Send + Sync {
    async fn record(&self, row: &AutomationLogRow) -> Result<()>;
}

/// Discards rows.
pub struct NoopAutomationLog;

#[async_trait]
impl AutomationLog for NoopAutomationLog {
    async fn record(&self, row: &AutomationLogRow) -> Result<()> {
        debug!(automation = %row.automation_name, "Automation log disabled, row dropped");
        Ok(())
    }
}

/// Inserts rows through a PostgREST endpoint, e.g.
/// `https://<project>.supabase.co/rest/v1/automation_logs`.
pub struct RestAutomationLog {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl RestAutomationLog {
    /// `timeout` bounds each insert, connect included.
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchboardError::Config(format!("automation log client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl AutomationLog for RestAutomationLog {
    async fn record(&self, row: &AutomationLogRow) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Prefer", "return=minimal")
            .json(row);

        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SwitchboardError::Protocol(format!("automation log insert failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwitchboardError::Protocol(format!(
                "automation log insert returned {status}: {body}"
            )));
        }

        debug!(automation = %row.automation_name, "Automation log row written");
        Ok(())
    }
}
