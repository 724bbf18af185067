//! WebSocket client for the Home Assistant socket API
//!
//! Each call drives a strict sequential handshake over a fresh socket:
//!
//! 1. wait for the `auth_required` hello frame
//! 2. send `{"type": "auth", "access_token": ...}` and expect `auth_ok`
//! 3. send the request tagged with id 1
//! 4. wait for the frame carrying that id, close the socket and settle
//!
//! The whole exchange runs under a deadline and an optional cancellation
//! token; when either fires the session future is dropped, which closes the
//! socket.

use crate::client::{CallOptions, HomeAssistantClient, ServerConnection};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Request ids, fresh per session and starting at 1
#[derive(Debug, Default)]
struct RequestIds {
    last: u64,
}

impl RequestIds {
    fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

/// Handshake frame (`auth_required`, `auth_ok`, `auth_invalid`)
#[derive(Debug, Deserialize)]
struct HandshakeFrame {
    #[serde(rename = "type")]
    frame_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Socket API client; one socket per call, no reuse
#[derive(Debug, Clone, Default)]
pub struct WebSocketClient {
    options: CallOptions,
}

impl WebSocketClient {
    pub fn new(options: CallOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Issue one request with explicit per-call options
    pub async fn call_with(
        &self,
        connection: &ServerConnection,
        request: Value,
        options: &CallOptions,
    ) -> Result<Value> {
        let socket_url = connection.socket_url().as_str();
        let session = run_session(socket_url, connection.token(), request);
        let cancel = options.cancel.clone().unwrap_or_default();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(socket_url, "Call cancelled, closing socket");
                Err(BridgeError::cancelled(format!("call to {socket_url} cancelled")))
            }
            outcome = tokio::time::timeout(options.timeout, session) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(socket_url, timeout_ms = options.timeout.as_millis() as u64, "Call timed out, closing socket");
                    Err(BridgeError::timeout(format!(
                        "no response from {socket_url} within {:?}",
                        options.timeout
                    )))
                }
            },
        }
    }
}

#[async_trait]
impl HomeAssistantClient for WebSocketClient {
    async fn call(&self, connection: &ServerConnection, request: Value) -> Result<Value> {
        self.call_with(connection, request, &self.options).await
    }
}

async fn run_session(socket_url: &str, token: &str, request: Value) -> Result<Value> {
    let Value::Object(request) = request else {
        return Err(BridgeError::invalid_input("request must be a JSON object"));
    };

    let (mut ws, response) = connect_async(socket_url)
        .await
        .map_err(|e| BridgeError::connection(format!("Failed to open socket to {socket_url}: {e}")))?;
    debug!(socket_url, status = ?response.status(), "Socket opened");

    let outcome = exchange(&mut ws, token, request).await;

    if let Err(e) = ws.close(None).await {
        debug!(socket_url, error = %e, "Socket close failed");
    }
    outcome
}

async fn exchange(ws: &mut WsStream, token: &str, mut request: Map<String, Value>) -> Result<Value> {
    let hello = next_text(ws, "hello").await?;
    let hello: HandshakeFrame =
        serde_json::from_str(&hello).map_err(|_| BridgeError::protocol("Invalid hello"))?;
    match hello.frame_type.as_deref() {
        Some("auth_required") => {}
        other => {
            return Err(BridgeError::protocol(format!(
                "Unexpected hello: {}",
                other.unwrap_or("<missing type>")
            )))
        }
    }

    send_json(ws, &json!({ "type": "auth", "access_token": token })).await?;

    let auth = next_text(ws, "auth response").await?;
    let auth: HandshakeFrame = serde_json::from_str(&auth)
        .map_err(|_| BridgeError::authentication("invalid auth response"))?;
    if auth.frame_type.as_deref() != Some("auth_ok") {
        return Err(match auth.message {
            Some(reason) => BridgeError::authentication(format!("auth failed: {reason}")),
            None => BridgeError::authentication("auth failed"),
        });
    }

    let mut ids = RequestIds::default();
    let id = ids.next();
    request.insert("id".to_string(), Value::from(id));
    debug!(request_id = id, command = ?request.get("type"), "Sending request");
    send_json(ws, &Value::Object(request)).await?;

    loop {
        let text = next_text(ws, "result").await?;
        // Frames that do not parse or carry another id are not ours
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            debug!("Ignoring unparseable frame");
            continue;
        };
        if frame.get("id").and_then(Value::as_u64) != Some(id) {
            continue;
        }
        return settle(frame);
    }
}

/// Outcome of the frame matching the request id
fn settle(mut frame: Value) -> Result<Value> {
    if frame.get("success").and_then(Value::as_bool) == Some(false) {
        let message = frame
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("command failed");
        return Err(BridgeError::command(message));
    }
    match frame.get_mut("result").map(Value::take) {
        Some(Value::Null) | None => Ok(Value::Array(Vec::new())),
        Some(result) => Ok(result),
    }
}

async fn send_json(ws: &mut WsStream, frame: &Value) -> Result<()> {
    ws.send(Message::Text(frame.to_string()))
        .await
        .map_err(|e| BridgeError::connection(format!("Failed to send frame: {e}")))
}

async fn next_text(ws: &mut WsStream, phase: &str) -> Result<String> {
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => return Ok(text),
            Message::Binary(data) => return Ok(String::from_utf8_lossy(&data).into_owned()),
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                return Err(BridgeError::connection(format!(
                    "Socket closed by server while waiting for {phase} {reason}"
                )
                .trim_end()
                .to_string()));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Err(BridgeError::connection(format!(
        "Socket closed while waiting for {phase}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_start_at_one() {
        let mut ids = RequestIds::default();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[test]
    fn test_settle_tolerates_missing_fields() {
        assert_eq!(settle(json!({"id": 1, "type": "result"})).unwrap(), json!([]));
        assert_eq!(
            settle(json!({"id": 1, "success": true, "result": null})).unwrap(),
            json!([])
        );
        assert_eq!(
            settle(json!({"id": 1, "success": true, "result": {"a": 1}})).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_settle_failure_with_odd_error_shapes() {
        for frame in [
            json!({"id": 1, "success": false}),
            json!({"id": 1, "success": false, "error": "nope"}),
            json!({"id": 1, "success": false, "error": {"code": "x"}}),
            json!({"id": 1, "success": false, "error": {"message": 42}}),
        ] {
            let err = settle(frame).unwrap_err();
            assert!(matches!(err, BridgeError::Command(_)));
            assert_eq!(err.message(), "command failed");
        }

        let err = settle(json!({"success": false, "error": {"message": "nope"}})).unwrap_err();
        assert_eq!(err.message(), "nope");
    }

    #[tokio::test]
    async fn test_non_object_request_is_rejected() {
        let err = run_session("ws://127.0.0.1:1/api/websocket", "t", json!(["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }
}
