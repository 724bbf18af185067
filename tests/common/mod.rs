//! Common test utilities
//!
//! [`MockHomeAssistantServer`] is a real socket server on an ephemeral port
//! that plays the Home Assistant side of the handshake from a
//! [`ServerScript`].

#![allow(dead_code)]

use echo_ha_bridge::client::ServerConnection;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub const HA_VERSION: &str = "2024.6.0";

/// What the server sends at each step; `None` means stay silent
#[derive(Debug, Clone)]
pub struct ServerScript {
    pub hello: Option<String>,
    pub auth_reply: Option<String>,
    /// Frames sent right before a result frame
    pub noise: Vec<String>,
    /// Result frame per command type; the request id is filled in
    pub results: HashMap<String, Value>,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self {
            hello: Some(json!({"type": "auth_required", "ha_version": HA_VERSION}).to_string()),
            auth_reply: Some(json!({"type": "auth_ok", "ha_version": HA_VERSION}).to_string()),
            noise: Vec::new(),
            results: HashMap::new(),
        }
    }
}

impl ServerScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, command: &str, result: Value) -> Self {
        self.with_frame(
            command,
            json!({"type": "result", "success": true, "result": result}),
        )
    }

    pub fn with_failure(self, command: &str, message: &str) -> Self {
        self.with_frame(
            command,
            json!({
                "type": "result",
                "success": false,
                "error": {"code": "unknown_error", "message": message}
            }),
        )
    }

    /// Answer `command` with a raw result frame
    pub fn with_frame(mut self, command: &str, frame: Value) -> Self {
        self.results.insert(command.to_string(), frame);
        self
    }

    pub fn with_hello(mut self, hello: Option<&str>) -> Self {
        self.hello = hello.map(str::to_string);
        self
    }

    pub fn with_auth_reply(mut self, reply: Option<&str>) -> Self {
        self.auth_reply = reply.map(str::to_string);
        self
    }

    pub fn with_noise(mut self, frame: &str) -> Self {
        self.noise.push(frame.to_string());
        self
    }
}

pub struct MockHomeAssistantServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockHomeAssistantServer {
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let received = received.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(handle(stream, script.clone(), received.clone()));
                }
            })
        };

        Self {
            addr,
            received,
            connections,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn connection(&self, token: &str) -> ServerConnection {
        ServerConnection::new(&self.base_url(), token).unwrap()
    }

    /// Every JSON frame the server received, across all sockets
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockHomeAssistantServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

/// Keep the socket open until the client goes away
async fn hold(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

async fn handle(stream: TcpStream, script: ServerScript, received: Arc<Mutex<Vec<Value>>>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let Some(hello) = script.hello else {
        return hold(&mut ws).await;
    };
    if ws.send(Message::Text(hello)).await.is_err() {
        return;
    }

    let Some(auth) = next_json(&mut ws).await else {
        return;
    };
    received.lock().unwrap().push(auth);

    let Some(auth_reply) = script.auth_reply else {
        return hold(&mut ws).await;
    };
    if ws.send(Message::Text(auth_reply)).await.is_err() {
        return;
    }

    let Some(request) = next_json(&mut ws).await else {
        return;
    };
    received.lock().unwrap().push(request.clone());

    let command = request["type"].as_str().unwrap_or_default();
    let Some(mut frame) = script.results.get(command).cloned() else {
        return hold(&mut ws).await;
    };
    frame["id"] = request["id"].clone();

    for noise in script.noise {
        if ws.send(Message::Text(noise)).await.is_err() {
            return;
        }
    }
    if ws.send(Message::Text(frame.to_string())).await.is_err() {
        return;
    }

    hold(&mut ws).await;
}
