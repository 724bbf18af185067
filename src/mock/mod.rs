//! Mock implementations for testing
//!
//! [`MockHomeAssistantClient`] answers by command type and records every call.

use crate::client::{HomeAssistantClient, ServerConnection};
use crate::error::{BridgeError, ErrorKind, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone)]
enum Reply {
    Result(Value),
    Error(ErrorKind, String),
}

/// Mock Home Assistant client keyed by request `type`
#[derive(Default)]
pub struct MockHomeAssistantClient {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockHomeAssistantClient {
    /// Create new mock client; unknown commands fail with a command error
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `result`
    pub fn with_result(mut self, command: &str, result: Value) -> Self {
        self.replies.insert(command.to_string(), Reply::Result(result));
        self
    }

    /// Fail `command` with an error of the same kind and message
    pub fn with_error(mut self, command: &str, error: BridgeError) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Error(error.kind(), error.message()));
        self
    }

    /// Recorded calls as `(socket url, request)`
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HomeAssistantClient for MockHomeAssistantClient {
    async fn call(&self, connection: &ServerConnection, request: Value) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((connection.socket_url().to_string(), request.clone()));
        }

        let command = request
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match self.replies.get(command) {
            Some(Reply::Result(value)) => Ok(value.clone()),
            Some(Reply::Error(kind, message)) => Err(BridgeError::from_kind(*kind, message.clone())),
            None => Err(BridgeError::command(format!("Unknown command: {command}"))),
        }
    }
}
