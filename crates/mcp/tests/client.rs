//! Connection lifecycle tests for `ProtocolClient` against a scripted transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_common::{Result, SwitchboardError};
use switchboard_mcp::{
    ClientTimeouts, Launcher, ProtocolClient, ServerCommand, ToolEnvelope, ToolInfo, Transport,
};

#[derive(Default)]
struct Counters {
    spawns: AtomicUsize,
    lists: AtomicUsize,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

/// Launcher whose transports answer from a fixed script.
///
/// `slow` sleeps for 5s before answering, `fail` returns `isError: true`,
/// anything else echoes its arguments back as JSON text.
struct ScriptedLauncher {
    counters: Arc<Counters>,
    launch_delay: Duration,
    refuse: bool,
}

impl ScriptedLauncher {
    fn new() -> (Arc<Self>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let launcher = Arc::new(Self {
            counters: counters.clone(),
            launch_delay: Duration::ZERO,
            refuse: false,
        });
        (launcher, counters)
    }
}

struct ScriptedTransport {
    counters: Arc<Counters>,
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, server: &str, _command: &ServerCommand) -> Result<Box<dyn Transport>> {
        if self.refuse {
            return Err(SwitchboardError::connection(server, "spawn failed: not found"));
        }
        tokio::time::sleep(self.launch_delay).await;
        self.counters.spawns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransport {
            counters: self.counters.clone(),
        }))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ToolInfo {
            name: "get".into(),
            description: Some("Read a key".into()),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolEnvelope> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        match name {
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolEnvelope::text("late"))
            }
            "fail" => Ok(ToolEnvelope::error("key not found")),
            _ => Ok(ToolEnvelope::text(arguments.to_string())),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn client(launcher: Arc<ScriptedLauncher>) -> ProtocolClient {
    ProtocolClient::with_launcher(
        "redis",
        ServerCommand::new("./subagents/redis-agent.sh", vec![]),
        launcher,
    )
}

#[tokio::test]
async fn connect_is_idempotent() {
    let (launcher, counters) = ScriptedLauncher::new();
    let client = client(launcher);

    client.connect().await.unwrap();
    client.connect().await.unwrap();

    assert!(client.is_connected());
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn calls_connect_lazily() {
    let (launcher, counters) = ScriptedLauncher::new();
    let client = client(launcher);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "get");

    let envelope = client.call_tool("get", json!({"key": "session:1"})).await.unwrap();
    assert_eq!(envelope.decode_payload()["key"], "session:1");
    assert_eq!(counters.lists.load(Ordering::SeqCst), 1);
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_leaves_connection_usable() {
    let (launcher, counters) = ScriptedLauncher::new();
    let client = client(launcher);

    let err = client
        .call_tool_with_timeout("slow", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let envelope = client
        .call_tool_with_timeout("get", json!({"key": "k"}), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(envelope.decode_payload()["key"], "k");
    assert!(client.is_connected());
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_then_reconnect_spawns_new_process() {
    let (launcher, counters) = ScriptedLauncher::new();
    let client = client(launcher);

    client.connect().await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_connected());
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

    client.call_tool("get", json!({})).await.unwrap();
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn application_errors_are_data_unless_checked() {
    let (launcher, _) = ScriptedLauncher::new();
    let client = client(launcher);

    let envelope = client.call_tool("fail", json!({})).await.unwrap();
    assert!(envelope.is_error);

    let err = client.call_tool_checked("fail", json!({})).await.unwrap_err();
    match err {
        SwitchboardError::Application { tool, message } => {
            assert_eq!(tool, "fail");
            assert_eq!(message, "key not found");
        }
        other => panic!("expected application error, got {other:?}"),
    }
}

#[tokio::test]
async fn refused_launch_is_a_connection_error() {
    let counters = Arc::new(Counters::default());
    let launcher = Arc::new(ScriptedLauncher {
        counters: counters.clone(),
        launch_delay: Duration::ZERO,
        refuse: true,
    });
    let client = client(launcher);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Connection { .. }));
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn slow_handshake_times_out() {
    let counters = Arc::new(Counters::default());
    let launcher = Arc::new(ScriptedLauncher {
        counters: counters.clone(),
        launch_delay: Duration::from_secs(60),
        refuse: false,
    });
    let client = client(launcher).with_timeouts(ClientTimeouts {
        handshake_ms: 1_000,
        ..ClientTimeouts::default()
    });

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Connection { .. }));
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_are_serialized() {
    let (launcher, counters) = ScriptedLauncher::new();
    let client = Arc::new(client(launcher));
    let started = tokio::time::Instant::now();

    let a = {
        let client = client.clone();
        tokio::spawn(async move { client.call_tool("slow", json!({})).await })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move { client.call_tool("slow", json!({})).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(counters.calls.load(Ordering::SeqCst), 2);
    assert_eq!(counters.spawns.load(Ordering::SeqCst), 1);
}
