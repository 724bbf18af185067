//! Error types for the Home Assistant bridge
//!
//! This module provides the error taxonomy shared by the socket client, the
//! connection resolver, the registry façade and the flow nodes, together with
//! a machine-readable error kind and structured logging integration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error types for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Socket open or transport failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or out-of-sequence handshake frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credential rejected by the server
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server answered the issued request with `success: false`
    #[error("{0}")]
    Command(String),

    /// No usable server connection could be resolved
    #[error("Configuration error: {0}")]
    Config(String),

    /// No settlement within the configured bound
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Requested entity or instance absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Call cancelled by its caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable error kind, exposed alongside human-readable messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
    Authentication,
    Command,
    Configuration,
    Timeout,
    NotFound,
    Cancelled,
    InvalidInput,
    InvalidState,
    Internal,
}

impl ErrorKind {
    /// Stable identifier used in logs and HTTP headers
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Command => "command",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP status class for this kind.
    ///
    /// Caller-correctable problems map to 400, everything on the transport
    /// or server side maps to 500.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Configuration | ErrorKind::NotFound | ErrorKind::InvalidInput => 400,
            _ => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        BridgeError::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        BridgeError::Protocol(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        BridgeError::Authentication(msg.into())
    }

    /// Create a command error
    pub fn command<S: Into<String>>(msg: S) -> Self {
        BridgeError::Command(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        BridgeError::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        BridgeError::Timeout(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        BridgeError::NotFound(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        BridgeError::Cancelled(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidInput(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidState(msg.into())
    }

    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Connection(_) => ErrorKind::Connection,
            BridgeError::Protocol(_) => ErrorKind::Protocol,
            BridgeError::Authentication(_) => ErrorKind::Authentication,
            BridgeError::Command(_) => ErrorKind::Command,
            BridgeError::Config(_) => ErrorKind::Configuration,
            BridgeError::Timeout(_) => ErrorKind::Timeout,
            BridgeError::NotFound(_) => ErrorKind::NotFound,
            BridgeError::Cancelled(_) => ErrorKind::Cancelled,
            BridgeError::InvalidInput(_) => ErrorKind::InvalidInput,
            BridgeError::InvalidState(_) => ErrorKind::InvalidState,
            BridgeError::Json(_) | BridgeError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild an error from its kind and message
    pub fn from_kind<S: Into<String>>(kind: ErrorKind, msg: S) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::Connection => BridgeError::Connection(msg),
            ErrorKind::Protocol => BridgeError::Protocol(msg),
            ErrorKind::Authentication => BridgeError::Authentication(msg),
            ErrorKind::Command => BridgeError::Command(msg),
            ErrorKind::Configuration => BridgeError::Config(msg),
            ErrorKind::Timeout => BridgeError::Timeout(msg),
            ErrorKind::NotFound => BridgeError::NotFound(msg),
            ErrorKind::Cancelled => BridgeError::Cancelled(msg),
            ErrorKind::InvalidInput => BridgeError::InvalidInput(msg),
            ErrorKind::InvalidState => BridgeError::InvalidState(msg),
            ErrorKind::Internal => {
                BridgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, msg))
            }
        }
    }

    /// Check if error is retryable by a caller-side retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Connection(_) | BridgeError::Timeout(_))
    }

    /// Check if error indicates authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BridgeError::Authentication(_))
    }

    /// Message without the variant prefix, suitable for HTTP bodies
    pub fn message(&self) -> String {
        match self {
            BridgeError::Connection(m)
            | BridgeError::Protocol(m)
            | BridgeError::Authentication(m)
            | BridgeError::Command(m)
            | BridgeError::Config(m)
            | BridgeError::Timeout(m)
            | BridgeError::NotFound(m)
            | BridgeError::Cancelled(m)
            | BridgeError::InvalidInput(m)
            | BridgeError::InvalidState(m) => m.clone(),
            BridgeError::Json(e) => e.to_string(),
            BridgeError::Io(e) => e.to_string(),
        }
    }
}

/// Error logging utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log an error with its kind and the component/operation that raised it
    pub fn log_error(error: &BridgeError, component: &str, operation: &str) {
        let kind = error.kind();
        if kind.http_status() == 400 {
            tracing::warn!(
                error_kind = kind.as_str(),
                component,
                operation,
                "Warning: {}",
                error
            );
        } else {
            tracing::error!(
                error_kind = kind.as_str(),
                component,
                operation,
                retryable = error.is_retryable(),
                "Error occurred: {}",
                error
            );
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Connection(err.to_string())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}
