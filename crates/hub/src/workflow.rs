//! Sequential workflows over hub tools.
//!
//! A workflow is an ordered list of tool names. Each step receives the
//! arguments of the previous step plus that step's result under
//! [`CARRY_KEY`]. The first failing step stops the run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument key under which a step receives the previous step's result.
pub const CARRY_KEY: &str = "lastStepResult";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub id: String,
    pub name: String,
    pub steps: Vec<String>,
}

impl WorkflowDescriptor {
    pub fn new<S: Into<String>>(id: impl Into<String>, name: impl Into<String>, steps: Vec<S>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(step: &str, result: Value, duration_ms: u64) -> Self {
        Self {
            step: step.to_string(),
            status: StepStatus::Success,
            result: Some(result),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(step: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step: step.to_string(),
            status: StepStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub workflow_name: String,
    pub step_results: Vec<StepResult>,
    pub status: WorkflowStatus,
    pub duration_ms: u64,
}

impl WorkflowExecution {
    pub fn succeeded_steps(&self) -> usize {
        self.step_results
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count()
    }

    pub fn failed_steps(&self) -> usize {
        self.step_results.len() - self.succeeded_steps()
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

/// Initial step arguments. Objects pass through, `null` becomes `{}` and any
/// other value is wrapped under `input`.
pub fn initial_args(args: Value) -> Value {
    match args {
        Value::Object(_) => args,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("input".into(), other);
            Value::Object(map)
        }
    }
}

/// Arguments for the step after one that produced `result`.
pub fn carry_forward(mut args: Value, result: Value) -> Value {
    if let Value::Object(map) = &mut args {
        map.insert(CARRY_KEY.to_string(), result);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_args_are_normalized() {
        assert_eq!(initial_args(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(initial_args(Value::Null), json!({}));
        assert_eq!(initial_args(json!("lamp")), json!({"input": "lamp"}));
    }

    #[test]
    fn carry_replaces_previous_result() {
        let args = carry_forward(json!({"text": "lamp"}), json!({"score": 1}));
        let args = carry_forward(args, json!({"score": 2}));
        assert_eq!(args, json!({"text": "lamp", "lastStepResult": {"score": 2}}));
    }

    #[test]
    fn step_counts() {
        let execution = WorkflowExecution {
            workflow_id: "w".into(),
            workflow_name: "W".into(),
            step_results: vec![
                StepResult::success("a", json!(1), 3),
                StepResult::failed("b", "boom", 4),
            ],
            status: WorkflowStatus::Failed,
            duration_ms: 7,
        };
        assert_eq!(execution.succeeded_steps(), 1);
        assert_eq!(execution.failed_steps(), 1);
        assert!(!execution.is_completed());

        let value = serde_json::to_value(&execution.step_results[1]).unwrap();
        assert_eq!(value, json!({"step": "b", "status": "failed", "error": "boom", "duration_ms": 4}));
    }
}
