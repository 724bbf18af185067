//! Home Assistant registry bridge for smart-speaker emulation flow nodes
//!
//! The crate talks to Home Assistant over its socket API and exposes the
//! device, entity, area and label registries to a flow editor through a small
//! admin HTTP API. Echo device nodes tag inbound automation messages with the
//! Home Assistant device and entity they are linked to.
//!
//! # Layout
//!
//! - [`client`]: one-shot socket client (connect, authenticate, one request)
//! - [`config`]: layered configuration, config directory and connection resolver
//! - [`registry`]: registry query façade and mode detection
//! - [`flow`]: flow message model, echo device and hub nodes
//! - [`http_transport`]: admin endpoints
//! - [`error_recovery`]: caller-side retry

pub mod client;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod flow;
pub mod http_transport;
pub mod logging;
pub mod registry;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use client::{CallOptions, HomeAssistantClient, ServerConnection, WebSocketClient};
pub use config::{ConnectionResolver, ManagedEnvironment, ServerConfig};
pub use error::{BridgeError, ErrorKind, Result};
pub use registry::RegistryService;
