//! Operation planning through a hosted model.
//!
//! When a task reaches a subprocess backend without an explicit operation,
//! the planner shows a model the backend's operation menu and asks for a
//! single JSON object `{"operationName": ..., "args": {...}}`. Anything that
//! cannot be parsed or names an operation outside the menu is a
//! [`SwitchboardError::Planning`] error; the router then falls back to the
//! backend's default operation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::{Result, SwitchboardError};
use switchboard_llm::{ExecuteOptions, HostedAgent};
use switchboard_mcp::ToolInfo;
use tracing::{debug, info};

use crate::config::OperationSpec;

const PLANNER_TEMPERATURE: f32 = 0.2;
const PLANNER_MAX_TOKENS: u32 = 1000;

const PLANNER_INSTRUCTIONS: &str = r#"You choose which operation a backend should run for a task.

IMPORTANT: Respond ONLY with a JSON object, no other text. The JSON must have this exact structure:

{"operationName": "<one of the operation names below>", "args": { ... }}

Rules:
- "operationName" must be copied exactly from the list of available operations
- "args" must be a JSON object matching that operation's parameters
- If unsure, pick the closest operation and pass the task text in "args""#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOperation {
    #[serde(rename = "operationName")]
    pub operation_name: String,
    #[serde(default)]
    pub args: Value,
}

impl From<&ToolInfo> for OperationSpec {
    fn from(tool: &ToolInfo) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            params: tool.input_schema.clone(),
        }
    }
}

pub struct OperationPlanner {
    agent: Arc<HostedAgent>,
}

impl OperationPlanner {
    pub fn new(agent: Arc<HostedAgent>) -> Self {
        Self { agent }
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub async fn plan(
        &self,
        backend: &str,
        task: &str,
        menu: &[OperationSpec],
    ) -> Result<PlannedOperation> {
        if menu.is_empty() {
            return Err(SwitchboardError::Planning(format!(
                "backend '{backend}' offers no operations"
            )));
        }

        let prompt = build_prompt(backend, task, menu);
        let options = ExecuteOptions {
            temperature: Some(PLANNER_TEMPERATURE),
            max_tokens: Some(PLANNER_MAX_TOKENS),
            history: Vec::new(),
        };

        let outcome = self.agent.execute(&prompt, options).await;
        if !outcome.success {
            return Err(SwitchboardError::Planning(format!(
                "planner '{}' failed: {}",
                self.agent.name(),
                outcome.error.unwrap_or_default()
            )));
        }

        debug!(planner = %self.agent.name(), response = %outcome.content, "Planner response");
        let planned = parse_plan(&outcome.content, menu)?;

        info!(
            backend = %backend,
            operation = %planned.operation_name,
            "Planner chose operation"
        );
        Ok(planned)
    }
}

pub fn build_prompt(backend: &str, task: &str, menu: &[OperationSpec]) -> String {
    let mut listing = String::new();
    for op in menu {
        listing.push_str(&format!("- {}", op.name));
        if !op.description.is_empty() {
            listing.push_str(&format!(": {}", op.description));
        }
        if !op.params.is_null() {
            listing.push_str(&format!("\n  params: {}", op.params));
        }
        listing.push('\n');
    }

    format!(
        "{PLANNER_INSTRUCTIONS}\n\nBackend: {backend}\n\nAvailable operations:\n{listing}\nTask:\n{task}"
    )
}

/// Parse a planner reply, tolerating markdown fences and surrounding prose.
pub fn parse_plan(response: &str, menu: &[OperationSpec]) -> Result<PlannedOperation> {
    let cleaned = strip_code_fences(response);
    let json_str = extract_json_object(&cleaned).ok_or_else(|| {
        SwitchboardError::Planning(format!(
            "No valid JSON found in response: {}",
            response.chars().take(200).collect::<String>()
        ))
    })?;

    let mut planned: PlannedOperation = serde_json::from_str(json_str)
        .map_err(|e| SwitchboardError::Planning(format!("Invalid JSON: {e}")))?;

    if !menu.iter().any(|op| op.name == planned.operation_name) {
        return Err(SwitchboardError::Planning(format!(
            "operation '{}' is not on the menu",
            planned.operation_name
        )));
    }

    if planned.args.is_null() {
        planned.args = Value::Object(Default::default());
    } else if !planned.args.is_object() {
        return Err(SwitchboardError::Planning(
            "args must be a JSON object".to_string(),
        ));
    }

    Ok(planned)
}

fn strip_code_fences(s: &str) -> String {
    s.replace("```json", "").replace("```", "")
}

/// Extract a JSON object from a string that may contain other text.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
