//! The WebSocket bridge: the boundary any UI talks to.
//!
//! Clients send `type`-tagged JSON frames (`ping`, `submit`, `getStatus`,
//! `cancelAll`) and receive a response frame per request plus unsolicited
//! `queueProgress` pushes whenever the queue changes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::notify::{Notifier, QueueProgress};
use crate::queue::{ActionKind, QueueEngine, SubmittedUser};

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub listen: String,
}

// ── Request protocol ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BridgeRequest {
    Ping,
    Submit {
        action: ActionKind,
        #[serde(default)]
        users: Vec<SubmittedUser>,
    },
    GetStatus,
    CancelAll,
}

// ── Frames ──────────────────────────────────────────────────────────────────

fn hello_frame() -> String {
    json!({
        "type": "hello",
        "agent": "followbridge",
        "version": env!("CARGO_PKG_VERSION"),
    })
    .to_string()
}

fn error_frame(error: &str) -> String {
    json!({
        "type": "error",
        "success": false,
        "error": error,
    })
    .to_string()
}

fn progress_frame(progress: &QueueProgress) -> String {
    let mut value = serde_json::to_value(progress).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("type".to_string(), json!("queueProgress"));
    }
    value.to_string()
}

// ── Server ──────────────────────────────────────────────────────────────────

/// Run the bridge server until the cancel token fires.
pub async fn run_bridge(
    engine: Arc<QueueEngine>,
    notifier: Notifier,
    options: BridgeOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = resolve_listen_addr(&options.listen)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind bridge to {}", addr))?;
    info!(%addr, "Bridge listening");
    serve(listener, engine, notifier, cancel).await
}

/// Accept-loop on an already-bound listener. Split out so tests can bind
/// an ephemeral port first.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<QueueEngine>,
    notifier: Notifier,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let engine = Arc::clone(&engine);
                let notifier = notifier.clone();
                let child_cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, peer, engine, notifier, child_cancel).await {
                        debug!(%peer, error = %err, "Bridge connection ended with error");
                    }
                });
            }
        }
    }

    Ok(())
}

fn resolve_listen_addr(listen: &str) -> Result<SocketAddr> {
    let trimmed = listen.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        let url = Url::parse(trimmed).context("Invalid WebSocket URL")?;
        let host = url.host_str().context("WebSocket URL missing host")?;
        let port = url
            .port_or_known_default()
            .context("WebSocket URL missing port")?;
        let addr = format!("{}:{}", host, port);
        return addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", addr));
    }

    trimmed
        .parse()
        .with_context(|| format!("Invalid listen address {}", trimmed))
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    engine: Arc<QueueEngine>,
    notifier: Notifier,
    cancel: CancellationToken,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut writer, mut reader) = ws_stream.split();
    let mut progress_rx = notifier.subscribe();

    debug!(%peer, "Bridge client connected");

    writer
        .send(Message::Text(hello_frame().into()))
        .await
        .context("Failed to send hello message")?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = writer.send(Message::Close(None)).await;
                break;
            }
            pushed = progress_rx.recv() => {
                match pushed {
                    Ok(progress) => {
                        // Best-effort: a dead client surfaces on its next
                        // read, not here.
                        let _ = writer
                            .send(Message::Text(progress_frame(&progress).into()))
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Snapshots carry full state; only the latest matters.
                        debug!(%peer, skipped, "Client lagged behind progress pushes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = reader.next() => {
                let message = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                };
                match message {
                    Message::Text(text) => {
                        let frame = match dispatch_text_message(text.as_str(), &engine).await {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(%peer, error = %err, "Bridge request failed");
                                error_frame(&err.to_string())
                            }
                        };
                        writer
                            .send(Message::Text(frame.into()))
                            .await
                            .context("Failed to send response")?;
                    }
                    Message::Binary(_) => {
                        writer
                            .send(Message::Text(
                                error_frame("Binary frames are not supported").into(),
                            ))
                            .await
                            .context("Failed to send error response")?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    debug!(%peer, "Bridge client disconnected");
    Ok(())
}

/// Parse and execute one request frame, returning the response frame.
async fn dispatch_text_message(text: &str, engine: &Arc<QueueEngine>) -> Result<String> {
    let request: BridgeRequest =
        serde_json::from_str(text).map_err(|e| anyhow::anyhow!("Unknown action: {}", e))?;

    let frame = match request {
        BridgeRequest::Ping => json!({
            "type": "pong",
            "success": true,
            "message": "Bridge is active",
        }),
        BridgeRequest::Submit { action, users } => {
            let count = users.len();
            match engine.enqueue(action, users).await {
                Ok(queue_length) => json!({
                    "type": "submitResult",
                    "success": true,
                    "message": format!("Added {} users to {} queue", count, action),
                    "queueLength": queue_length,
                }),
                Err(err) => json!({
                    "type": "submitResult",
                    "success": false,
                    "error": err.to_string(),
                }),
            }
        }
        BridgeRequest::GetStatus => {
            let snapshot = engine.status().await;
            json!({
                "type": "status",
                "success": true,
                "queueLength": snapshot.queue_length,
                "isProcessing": snapshot.is_processing,
                "queue": snapshot.queue,
            })
        }
        BridgeRequest::CancelAll => {
            engine.cancel_all().await;
            json!({
                "type": "cancelResult",
                "success": true,
                "message": "Queue cleared",
            })
        }
    };

    Ok(frame.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_accepts_plain_and_ws_forms() {
        assert_eq!(
            resolve_listen_addr("127.0.0.1:8750").unwrap(),
            "127.0.0.1:8750".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_listen_addr("ws://127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert!(resolve_listen_addr("not an address").is_err());
    }

    #[test]
    fn request_frames_parse_by_type_tag() {
        let ping: BridgeRequest = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, BridgeRequest::Ping));

        let submit: BridgeRequest = serde_json::from_str(
            r#"{"type":"submit","action":"unfollow","users":[{"username":"alice"}]}"#,
        )
        .unwrap();
        match submit {
            BridgeRequest::Submit { action, users } => {
                assert_eq!(action, ActionKind::Unfollow);
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].username, "alice");
            }
            other => panic!("unexpected request: {:?}", other),
        }

        assert!(serde_json::from_str::<BridgeRequest>(r#"{"type":"selfDestruct"}"#).is_err());
    }

    #[test]
    fn hello_frame_structure() {
        let value: serde_json::Value = serde_json::from_str(&hello_frame()).unwrap();
        assert_eq!(value["type"], "hello");
        assert_eq!(value["agent"], "followbridge");
        assert!(value["version"].is_string());
    }

    #[test]
    fn progress_frame_is_tagged() {
        let progress = QueueProgress::new(&[], false);
        let value: serde_json::Value = serde_json::from_str(&progress_frame(&progress)).unwrap();
        assert_eq!(value["type"], "queueProgress");
        assert_eq!(value["isProcessing"], false);
        assert!(value["queue"].as_array().unwrap().is_empty());
    }
}
