//! Building the orchestrator from configuration files.

use switchboard::{Orchestrator, SwitchboardConfig};
use switchboard_common::SwitchboardError;

fn config(toml: &str) -> SwitchboardConfig {
    toml::from_str(toml).unwrap()
}

const WITH_HOSTED: &str = r#"
[observability]
enabled = false

[[router.backends]]
name = "redis"
kind = "subprocess"
command = "/nonexistent/redis-agent"
default_operation = "get"

[[router.backends]]
name = "grok"
kind = "hosted"
model = "x-ai/grok-2-1212:free"
api_key = "sk-or-test"
endpoint = "http://127.0.0.1:9/api/v1/chat/completions"

[[router.backends]]
name = "kate"
kind = "hosted"
model = "kat-coder-pro:free"
api_key = "sk-or-test"
endpoint = "http://127.0.0.1:9/api/v1/chat/completions"
"#;

#[tokio::test]
async fn hosted_backends_enable_marketplace_tools() {
    let orchestrator = Orchestrator::from_config(&config(WITH_HOSTED)).await.unwrap();

    assert_eq!(orchestrator.router.backend_names(), vec!["grok", "kate", "redis"]);

    let tools: Vec<String> = orchestrator.hub.tools().into_iter().map(|t| t.name).collect();
    assert_eq!(
        tools,
        vec![
            "market_impact_analysis",
            "notify_matching_users",
            "scrape_market_trends",
            "seo_optimize",
            "social_ad_generation",
        ]
    );
    assert_eq!(orchestrator.hub.workflows().len(), 2);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn missing_hosted_backends_leave_only_the_webhook() {
    let orchestrator = Orchestrator::from_config(&config(
        r#"
[observability]
enabled = false

[[router.backends]]
name = "grok"
kind = "hosted"
model = "x-ai/grok-2-1212:free"
api_key_env = "SWITCHBOARD_TEST_KEY_THAT_IS_NEVER_SET"
"#,
    ))
    .await
    .unwrap();

    assert!(orchestrator.router.backend_names().is_empty());
    let tools = orchestrator.hub.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "notify_matching_users");

    // Workflows are registered but fail at their first prompt step.
    let execution = orchestrator
        .hub
        .run_workflow("autonomous_marketing_cycle", serde_json::Value::Null)
        .await
        .unwrap();
    assert!(!execution.is_completed());
    assert_eq!(execution.step_results.len(), 1);
}

#[tokio::test]
async fn failed_dispatch_is_written_to_event_log() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");

    let mut cfg = config(WITH_HOSTED);
    cfg.observability.enabled = true;
    cfg.observability.jsonl_path = Some(events.clone());

    let orchestrator = Orchestrator::from_config(&cfg).await.unwrap();
    let err = orchestrator
        .router
        .dispatch("flush the session cache", Some("del"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchboardError::Connection { .. }));

    orchestrator.shutdown().await;

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(&events)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let names: Vec<&str> = lines.iter().filter_map(|l| l["event"].as_str()).collect();
    assert_eq!(names, vec!["dispatch.started", "dispatch.routed", "dispatch.failed"]);
    assert!(lines.iter().all(|l| l["source"] == "router"));
}

#[tokio::test]
async fn bridge_with_missing_server_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config("[observability]\nenabled = false");
    cfg.hub.bridge_enabled = true;
    cfg.hub.mcp_config_path = dir.path().join("mcp.json");

    let orchestrator = Orchestrator::from_config(&cfg).await.unwrap();
    let bridge = orchestrator.hub.bridge().unwrap();
    assert!(bridge.servers().is_empty());
    assert!(orchestrator.hub.remote_tools_summary().await.is_empty());
}
