//! Bridge protocol tests: a real WebSocket session against the gateway on
//! an ephemeral port, exercising ping/submit/getStatus/cancelAll and the
//! queueProgress pushes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use followbridge::actuator::{ActuationError, ActuationRequest};
use followbridge::client::BridgeClient;
use followbridge::gateway;
use followbridge::notify::Notifier;
use followbridge::queue::{
    ActionExecutor, ActionKind, EngineConfig, PacingPolicy, QueueEngine, QueueStore, SubmittedUser,
};

/// Executor that holds every action until the gate opens, so queue state
/// stays observable during the test.
struct GatedExecutor {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ActionExecutor for GatedExecutor {
    async fn execute(&self, _request: &ActuationRequest) -> Result<(), ActuationError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ActuationError::Page(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

struct TestBridge {
    addr: String,
    engine: Arc<QueueEngine>,
    cancel: CancellationToken,
    _dir: TempDir,
    gate: Arc<Semaphore>,
}

async fn start_bridge() -> TestBridge {
    let dir = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let store = QueueStore::new(dir.path().join("queue.json"));
    let notifier = Notifier::default();
    let engine = QueueEngine::new(
        EngineConfig {
            retry_limit: 2,
            action_timeout: Duration::from_secs(5),
            pacing: PacingPolicy::new(Duration::from_millis(1), Duration::from_millis(3)),
        },
        store,
        Arc::new(GatedExecutor { gate: gate.clone() }),
        notifier.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let cancel = CancellationToken::new();
    let serve_engine = Arc::clone(&engine);
    let serve_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = gateway::serve(listener, serve_engine, notifier, serve_cancel).await;
    });

    TestBridge {
        addr,
        engine,
        cancel,
        _dir: dir,
        gate,
    }
}

fn sample_users(names: &[&str]) -> Vec<SubmittedUser> {
    names
        .iter()
        .map(|name| SubmittedUser {
            username: name.to_string(),
            profile_url: None,
        })
        .collect()
}

#[tokio::test]
async fn ping_round_trip() {
    let bridge = start_bridge().await;
    let mut client = BridgeClient::connect(&bridge.addr).await.unwrap();

    let response = client.ping().await.unwrap();
    assert_eq!(response["type"], "pong");
    assert_eq!(response["success"], true);

    client.close().await;
    bridge.cancel.cancel();
}

#[tokio::test]
async fn submit_reports_queue_length_and_rejects_empty_batches() {
    let bridge = start_bridge().await;
    let mut client = BridgeClient::connect(&bridge.addr).await.unwrap();

    let response = client
        .submit(ActionKind::Unfollow, &sample_users(&["alice", "bob"]))
        .await
        .unwrap();
    assert_eq!(response["type"], "submitResult");
    assert_eq!(response["success"], true);
    assert_eq!(response["queueLength"], 2);
    assert_eq!(response["message"], "Added 2 users to unfollow queue");

    let response = client.submit(ActionKind::Follow, &[]).await.unwrap();
    assert_eq!(response["success"], false);
    assert_eq!(response["error"], "No users provided");

    // The rejected batch left the queue untouched.
    let status = client.status().await.unwrap();
    assert_eq!(status["queueLength"], 2);

    client.close().await;
    bridge.cancel.cancel();
}

#[tokio::test]
async fn status_reflects_queue_contents() {
    let bridge = start_bridge().await;
    let mut client = BridgeClient::connect(&bridge.addr).await.unwrap();

    client
        .submit(ActionKind::Follow, &sample_users(&["alice"]))
        .await
        .unwrap();

    let status = client.status().await.unwrap();
    assert_eq!(status["type"], "status");
    assert_eq!(status["success"], true);
    assert_eq!(status["queueLength"], 1);
    let item = &status["queue"][0];
    assert_eq!(item["username"], "alice");
    assert_eq!(item["action"], "follow");
    assert_eq!(item["profileUrl"], "https://www.instagram.com/alice/");

    client.close().await;
    bridge.cancel.cancel();
}

#[tokio::test]
async fn cancel_all_empties_the_queue() {
    let bridge = start_bridge().await;
    let mut client = BridgeClient::connect(&bridge.addr).await.unwrap();

    client
        .submit(ActionKind::Unfollow, &sample_users(&["alice", "bob"]))
        .await
        .unwrap();

    let response = client.cancel_all().await.unwrap();
    assert_eq!(response["type"], "cancelResult");
    assert_eq!(response["success"], true);
    assert_eq!(response["message"], "Queue cleared");

    let status = client.status().await.unwrap();
    assert_eq!(status["queueLength"], 0);
    assert_eq!(status["isProcessing"], false);

    client.close().await;
    bridge.cancel.cancel();
}

#[tokio::test]
async fn unknown_request_type_yields_error_frame() {
    let bridge = start_bridge().await;
    let mut client = BridgeClient::connect(&bridge.addr).await.unwrap();

    let response = client
        .request(serde_json::json!({ "type": "selfDestruct" }))
        .await
        .unwrap();
    assert_eq!(response["type"], "error");
    assert_eq!(response["success"], false);

    client.close().await;
    bridge.cancel.cancel();
}

#[tokio::test]
async fn observers_receive_queue_progress_pushes() {
    let bridge = start_bridge().await;

    // A raw observer connection: reads frames without issuing requests.
    let (mut observer, _) = connect_async(format!("ws://{}", bridge.addr))
        .await
        .unwrap();

    // Consume the hello frame first.
    let hello: Value = match observer.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    };
    assert_eq!(hello["type"], "hello");

    // A mutation through the engine must be pushed to the observer.
    bridge
        .engine
        .enqueue(ActionKind::Follow, sample_users(&["alice"]))
        .await
        .unwrap();

    let push = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match observer.next().await.unwrap().unwrap() {
                Message::Text(text) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    if frame["type"] == "queueProgress" {
                        return frame;
                    }
                }
                _ => continue,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(push["queue"][0]["username"], "alice");
    assert_eq!(push["queue"][0]["status"], "pending");
    assert!(push["isProcessing"].is_boolean());

    bridge.gate.add_permits(16);
    bridge.cancel.cancel();
}
