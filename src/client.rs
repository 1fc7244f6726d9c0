//! Client side of the bridge protocol, used by the CLI commands that talk
//! to a running bridge (`submit`, `queue`, `cancel`).

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::queue::{ActionKind, SubmittedUser};

pub struct BridgeClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl BridgeClient {
    /// Connect to a running bridge and consume its hello frame.
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = normalize_bridge_url(addr);
        let (ws, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to bridge at {} — is it running?", url))?;

        let mut client = Self { ws };
        let hello = client.next_frame().await?;
        if hello.get("type").and_then(Value::as_str) != Some("hello") {
            bail!("Unexpected greeting from bridge: {}", hello);
        }
        Ok(client)
    }

    pub async fn ping(&mut self) -> Result<Value> {
        self.request(json!({ "type": "ping" })).await
    }

    pub async fn submit(&mut self, action: ActionKind, users: &[SubmittedUser]) -> Result<Value> {
        self.request(json!({
            "type": "submit",
            "action": action,
            "users": users,
        }))
        .await
    }

    pub async fn status(&mut self) -> Result<Value> {
        self.request(json!({ "type": "getStatus" })).await
    }

    pub async fn cancel_all(&mut self) -> Result<Value> {
        self.request(json!({ "type": "cancelAll" })).await
    }

    /// Send one request and return its response frame, skipping any
    /// `queueProgress` pushes interleaved on the connection.
    pub async fn request(&mut self, request: Value) -> Result<Value> {
        self.ws
            .send(Message::Text(request.to_string().into()))
            .await
            .context("Failed to send request")?;

        loop {
            let frame = self.next_frame().await?;
            if frame.get("type").and_then(Value::as_str) == Some("queueProgress") {
                continue;
            }
            return Ok(frame);
        }
    }

    async fn next_frame(&mut self) -> Result<Value> {
        loop {
            let message = self
                .ws
                .next()
                .await
                .context("Bridge closed the connection")??;
            match message {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str())
                        .context("Invalid frame from bridge");
                }
                Message::Close(_) => bail!("Bridge closed the connection"),
                _ => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Accept "host:port" or a full ws:// / wss:// URL.
pub fn normalize_bridge_url(addr: &str) -> String {
    let trimmed = addr.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        format!("ws://{}", trimmed)
    }
}
