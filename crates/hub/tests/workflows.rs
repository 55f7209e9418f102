//! Workflow runs over the default marketplace tools and over closure tools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde_json::{Value, json};
use switchboard_common::{MemorySink, Observer, Result, SwitchboardError};
use switchboard_hub::{
    AutomationLog, AutomationLogRow, MarketplaceAgents, RestAutomationLog, StepStatus, ToolCategory, ToolDescriptor,
    ToolHub, ToolsConfig, WorkflowDescriptor, WorkflowStatus, default_tools, default_workflows,
};
use switchboard_llm::{HostedAgent, LlmClient, LlmRequest, LlmResponse, TextStream};

/// Replies with a canned answer unless the prompt contains `fail_on`.
struct KeywordModel {
    fail_on: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl KeywordModel {
    fn new(fail_on: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fail_on,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for KeywordModel {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        if let Some(marker) = self.fail_on
            && prompt.contains(marker)
        {
            return Err(SwitchboardError::Llm("OpenAI API error 401: invalid key".into()));
        }
        Ok(LlmResponse {
            content: format!("answer #{}", self.prompts.lock().unwrap().len()),
            model: "scripted".into(),
            usage: None,
            finish_reason: None,
        })
    }

    fn complete_stream(&self, _request: LlmRequest) -> TextStream {
        Box::pin(futures::stream::empty())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingLog {
    rows: Mutex<Vec<AutomationLogRow>>,
    fail: bool,
}

#[async_trait]
impl AutomationLog for RecordingLog {
    async fn record(&self, row: &AutomationLogRow) -> Result<()> {
        self.rows.lock().unwrap().push(row.clone());
        if self.fail {
            return Err(SwitchboardError::Protocol("automation log insert returned 503".into()));
        }
        Ok(())
    }
}

async fn notify_handler(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({"success": true, "notified": 3}))
}

async fn spawn_notify_stub() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/cron/shopping-agents-runner", get(notify_handler))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/cron/shopping-agents-runner"), hits)
}

fn marketplace_hub(
    analyst: Arc<KeywordModel>,
    writer: Arc<KeywordModel>,
    notify_url: String,
    log: Arc<RecordingLog>,
    observer: Observer,
) -> ToolHub {
    let agents = MarketplaceAgents {
        analyst: Arc::new(HostedAgent::new("grok", "", analyst)),
        writer: Arc::new(HostedAgent::new("kate", "", writer)),
    };
    let config = ToolsConfig {
        notify_url,
        notify_token_env: None,
        ..ToolsConfig::default()
    };

    let hub = ToolHub::new(observer).with_automation_log(log);
    for tool in default_tools(&agents, &config) {
        hub.register_tool(tool);
    }
    for workflow in default_workflows() {
        hub.register_workflow(workflow);
    }
    hub
}

#[tokio::test]
async fn listing_boost_stops_at_failed_market_analysis() {
    let (url, hits) = spawn_notify_stub().await;
    let analyst = KeywordModel::new(Some("market impact"));
    let writer = KeywordModel::new(None);
    let log = Arc::new(RecordingLog::default());
    let sink = Arc::new(MemorySink::new());
    let observer = Observer::spawn(vec![sink.clone()], 64);

    let hub = marketplace_hub(analyst.clone(), writer.clone(), url, log.clone(), observer.clone());

    let execution = hub
        .run_workflow(
            "listing_boost_masterpiece",
            json!({"text": "Vintage brass lamp", "topic": "vintage lighting"}),
        )
        .await
        .unwrap();

    assert_eq!(execution.status, WorkflowStatus::Failed);
    assert_eq!(execution.step_results.len(), 2);
    assert_eq!(execution.step_results[0].step, "seo_optimize");
    assert_eq!(execution.step_results[0].status, StepStatus::Success);
    assert_eq!(execution.step_results[1].step, "market_impact_analysis");
    assert_eq!(execution.step_results[1].status, StepStatus::Failed);
    assert!(execution.step_results[1].error.as_deref().unwrap().contains("401"));

    // Steps 3 and 4 never ran.
    assert!(writer.prompts().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(analyst.prompts().len(), 2);
    assert!(analyst.prompts()[0].starts_with("Optimize this for SEO: Vintage brass lamp"));

    let rows = log.rows.lock().unwrap().clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].automation_name, "Workflow: Listing Boost Masterpiece");
    assert_eq!(rows[0].status, "failed");
    assert_eq!(rows[0].records_succeeded, 1);
    assert_eq!(rows[0].records_failed, 1);

    observer.flush().await;
    let names = sink.names();
    assert_eq!(names.first().map(String::as_str), Some("workflow.started"));
    assert!(names.contains(&"workflow.step_failed".to_string()));
    assert_eq!(names.last().map(String::as_str), Some("workflow.completed"));
    assert_eq!(names.iter().filter(|n| *n == "tool.started").count(), 2);
}

#[tokio::test]
async fn listing_boost_completes_and_notifies() {
    let (url, hits) = spawn_notify_stub().await;
    let writer = KeywordModel::new(None);
    let log = Arc::new(RecordingLog::default());

    let hub = marketplace_hub(
        KeywordModel::new(None),
        writer.clone(),
        url,
        log.clone(),
        Observer::disabled(),
    );

    // No `text`: the ad step falls back to the previous step's content.
    let execution = hub
        .run_workflow("listing_boost_masterpiece", json!({"topic": "lamps"}))
        .await
        .unwrap();

    assert!(execution.is_completed());
    assert_eq!(execution.step_results.len(), 4);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        execution.step_results[3].result,
        Some(json!({"success": true, "notified": 3}))
    );
    assert_eq!(writer.prompts(), vec!["Create a viral social media ad for: answer #2"]);
    let rows = log.rows.lock().unwrap();
    assert_eq!(rows[0].status, "success");
    assert!(rows[0].error_details.is_null());
}

#[tokio::test]
async fn each_step_receives_previous_result() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let hub = ToolHub::new(Observer::disabled());

    for (name, output) in [("a", 1), ("b", 2), ("c", 3)] {
        let seen = seen.clone();
        hub.register_tool(ToolDescriptor::from_fn(name, name, ToolCategory::Dev, move |args| {
            seen.lock().unwrap().push(args);
            async move { Ok(json!({ "out": output })) }
        }));
    }
    hub.register_workflow(WorkflowDescriptor::new("abc", "ABC", vec!["a", "b", "c"]));

    let execution = hub.run_workflow("abc", json!("seed")).await.unwrap();

    assert!(execution.is_completed());
    assert_eq!(execution.step_results.len(), 3);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen[0], json!({"input": "seed"}));
    assert_eq!(seen[1], json!({"input": "seed", "lastStepResult": {"out": 1}}));
    assert_eq!(seen[2], json!({"input": "seed", "lastStepResult": {"out": 2}}));
}

#[tokio::test]
async fn missing_step_tool_fails_the_run() {
    let hub = ToolHub::new(Observer::disabled());
    hub.register_workflow(WorkflowDescriptor::new("w", "W", vec!["ghost"]));

    let execution = hub.run_workflow("w", json!({})).await.unwrap();
    assert_eq!(execution.status, WorkflowStatus::Failed);
    assert!(execution.step_results[0].error.as_deref().unwrap().contains("ghost"));
}

#[tokio::test]
async fn log_failure_does_not_mask_result() {
    let log = Arc::new(RecordingLog {
        fail: true,
        ..Default::default()
    });
    let hub = ToolHub::new(Observer::disabled()).with_automation_log(log.clone());
    hub.register_tool(ToolDescriptor::from_fn("ok", "ok", ToolCategory::Dev, |_| async {
        Ok(json!(true))
    }));
    hub.register_workflow(WorkflowDescriptor::new("w", "W", vec!["ok"]));

    let execution = hub.run_workflow("w", Value::Null).await.unwrap();
    assert!(execution.is_completed());
    assert_eq!(log.rows.lock().unwrap().len(), 1);
}

/// Accepts rows and never answers.
struct StalledLog;

#[async_trait]
impl AutomationLog for StalledLog {
    async fn record(&self, _row: &AutomationLogRow) -> Result<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_log_sink_does_not_block_the_run() {
    let hub = ToolHub::new(Observer::disabled())
        .with_automation_log(Arc::new(StalledLog))
        .with_log_timeout(Duration::from_secs(5));
    hub.register_tool(ToolDescriptor::from_fn("ok", "ok", ToolCategory::Dev, |_| async {
        Ok(json!(true))
    }));
    hub.register_workflow(WorkflowDescriptor::new("w", "W", vec!["ok"]));

    let execution = hub.run_workflow("w", Value::Null).await.unwrap();
    assert!(execution.is_completed());
}

#[tokio::test]
async fn rest_log_gives_up_on_silent_endpoint() {
    let app = Router::new().route(
        "/rest/v1/automation_logs",
        post(|| async {
            std::future::pending::<()>().await;
            "unreachable"
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let log = RestAutomationLog::new(
        format!("http://{addr}/rest/v1/automation_logs"),
        Some("service-key".into()),
        Duration::from_millis(200),
    )
    .unwrap();
    let row = AutomationLogRow {
        automation_name: "Workflow: W".into(),
        status: "success".into(),
        records_processed: 1,
        records_succeeded: 1,
        records_failed: 0,
        execution_duration_ms: 1,
        error_details: Value::Null,
    };

    let err = tokio::time::timeout(Duration::from_secs(5), log.record(&row))
        .await
        .expect("insert should time out on its own")
        .unwrap_err();
    assert!(err.to_string().contains("automation log insert failed"));
}

#[tokio::test]
async fn tools_can_be_added_while_shared() {
    let hub = Arc::new(ToolHub::new(Observer::disabled()));
    let registrar = hub.clone();

    tokio::spawn(async move {
        registrar.register_tool(ToolDescriptor::from_fn(
            "late",
            "Registered at runtime",
            ToolCategory::Research,
            |_| async { Ok(json!("here")) },
        ));
    })
    .await
    .unwrap();

    assert_eq!(hub.call_tool("late", json!({})).await.unwrap(), json!("here"));
}
