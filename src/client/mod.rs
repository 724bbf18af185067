//! Home Assistant socket API client
//!
//! One call opens one socket, performs the `auth_required → auth → auth_ok`
//! handshake, issues a single tagged request and closes the socket once the
//! matching result frame arrives. There is no pooling and no retry here;
//! callers that want retries wrap the call themselves.

pub mod connection;
pub mod websocket_client;

pub use connection::{ServerConnection, WEBSOCKET_PATH};
pub use websocket_client::WebSocketClient;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on a single call, handshake included
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Well-known command types issued by the registry façade
pub mod commands {
    pub const DEVICE_REGISTRY_LIST: &str = "config/device_registry/list";
    pub const ENTITY_REGISTRY_LIST: &str = "config/entity_registry/list";
    pub const AREA_REGISTRY_LIST: &str = "config/area_registry/list";
    pub const LABEL_REGISTRY_LIST: &str = "config/label_registry/list";
    pub const GET_STATES: &str = "get_states";

    /// Request object for a parameterless command
    pub fn request(command: &str) -> serde_json::Value {
        serde_json::json!({ "type": command })
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Deadline for the whole call: connect, handshake and response
    pub timeout: Duration,
    /// Optional token that force-closes the socket when triggered
    pub cancel: Option<CancellationToken>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            cancel: None,
        }
    }
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Client seam used by the registry façade
#[async_trait]
pub trait HomeAssistantClient: Send + Sync {
    /// Issue one request and resolve with the `result` field of the
    /// matching response (an empty array when the server omits it).
    async fn call(&self, connection: &ServerConnection, request: Value) -> Result<Value>;
}
