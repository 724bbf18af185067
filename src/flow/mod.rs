//! Flow host abstractions
//!
//! A flow node receives [`FlowMessage`]s and reports back through a
//! [`NodeContext`]: zero or more forwarded messages, zero or more errors and
//! exactly one completion signal. [`NodeRegistry`] owns the nodes built from
//! configuration and is what the admin endpoints talk to.

pub mod echo_device;
pub mod echo_hub;

pub use echo_device::EchoDeviceNode;
pub use echo_hub::{EchoHubNode, HubState};

use crate::config::ServerConfig;
use crate::error::{BridgeError, ErrorReporter, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Message payload: either an object or any other JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Object(Map<String, Value>),
    Scalar(Value),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Scalar(Value::Null)
    }
}

impl Payload {
    pub fn is_object(&self) -> bool {
        matches!(self, Payload::Object(_))
    }

    /// Object form of the payload; a scalar is wrapped as `{value: scalar}`
    pub fn into_object(self) -> Map<String, Value> {
        match self {
            Payload::Object(map) => map,
            Payload::Scalar(value) => {
                let mut wrapped = Map::new();
                wrapped.insert("value".to_string(), value);
                wrapped
            }
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Payload::Object(map),
            other => Payload::Scalar(other),
        }
    }
}

/// Inbound automation message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMessage {
    /// Target device identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviceid: Option<Value>,

    #[serde(default)]
    pub payload: Payload,

    /// Any other message properties, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowMessage {
    pub fn new(deviceid: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            deviceid: Some(Value::String(deviceid.into())),
            payload: payload.into(),
            extra: Map::new(),
        }
    }

    /// Target device identifier when it is a string
    pub fn device_id(&self) -> Option<&str> {
        self.deviceid.as_ref().and_then(Value::as_str)
    }
}

/// What a node reported while handling one input
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Send(FlowMessage),
    Error(String),
    Done,
}

/// Output side of a node for a single input
pub struct NodeContext {
    node_id: String,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeContext {
    pub fn channel(node_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                node_id: node_id.into(),
                events,
            },
            rx,
        )
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Forward a message to the node's output
    pub fn send(&self, msg: FlowMessage) -> Result<()> {
        self.events
            .send(NodeEvent::Send(msg))
            .map_err(|_| BridgeError::invalid_state(format!("output of node {} is closed", self.node_id)))
    }

    /// Report a processing error through the node's error channel
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(node_id = %self.node_id, "{}", message);
        let _ = self.events.send(NodeEvent::Error(message));
    }

    /// Signal that the input has been handled
    pub fn done(&self) {
        let _ = self.events.send(NodeEvent::Done);
    }
}

/// Collected result of one input, as returned by the inject endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOutcome {
    pub forwarded: Vec<FlowMessage>,
    pub errors: Vec<String>,
    pub done: bool,
}

impl InputOutcome {
    /// Drain every event a node emitted; the context must have been dropped
    pub async fn collect(mut events: mpsc::UnboundedReceiver<NodeEvent>) -> Self {
        let mut outcome = Self::default();
        while let Some(event) = events.recv().await {
            match event {
                NodeEvent::Send(msg) => outcome.forwarded.push(msg),
                NodeEvent::Error(e) => outcome.errors.push(e),
                NodeEvent::Done => outcome.done = true,
            }
        }
        outcome
    }
}

/// A node hosted by the bridge
#[async_trait]
pub trait FlowNode: Send + Sync {
    fn id(&self) -> &str;

    /// Node type, for logs
    fn kind(&self) -> &'static str;

    /// Handle one input; must call [`NodeContext::done`] exactly once
    fn on_input(&self, msg: FlowMessage, ctx: &NodeContext);

    /// Run the node's discovery routine
    async fn discover(&self) -> Result<()> {
        Err(BridgeError::invalid_input(format!(
            "{} node {} does not support discovery",
            self.kind(),
            self.id()
        )))
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Live nodes by instance id
#[derive(Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn FlowNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every device and hub node named in the configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut registry = Self::new();
        for linkage in &config.devices {
            registry.register(Arc::new(EchoDeviceNode::new(linkage.clone())))?;
        }
        for hub in &config.hubs {
            registry.register(Arc::new(EchoHubNode::new(hub.clone())))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, node: Arc<dyn FlowNode>) -> Result<()> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(BridgeError::invalid_input(format!("Duplicate node id: {id}")));
        }
        debug!(node_id = %id, kind = node.kind(), "Registered node");
        self.nodes.insert(id, node);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn FlowNode>> {
        self.nodes.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn require(&self, id: &str) -> Result<Arc<dyn FlowNode>> {
        self.get(id)
            .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found")))
    }

    /// Deliver one message to a node and collect what it reported
    pub async fn inject(&self, id: &str, msg: FlowMessage) -> Result<InputOutcome> {
        let node = self.require(id)?;
        let (ctx, events) = NodeContext::channel(id);
        node.on_input(msg, &ctx);
        drop(ctx);
        Ok(InputOutcome::collect(events).await)
    }

    pub async fn discover(&self, id: &str) -> Result<()> {
        self.require(id)?.discover().await
    }

    /// Start every node; a node that fails to start is logged and left failed
    pub async fn start_all(&self) {
        for node in self.nodes.values() {
            if let Err(e) = node.start().await {
                ErrorReporter::log_error(&e, node.kind(), "start");
            }
        }
        info!(nodes = self.nodes.len(), "Flow nodes started");
    }

    pub async fn close_all(&self) {
        for node in self.nodes.values() {
            node.close().await;
        }
        info!(nodes = self.nodes.len(), "Flow nodes closed");
    }
}
