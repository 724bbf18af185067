//! Server connection details and socket URL derivation

use crate::error::{BridgeError, Result};
use url::Url;

/// Path of the Home Assistant socket API, appended to the base URL
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// One remote Home Assistant endpoint with its credential.
///
/// Built fresh for every query and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConnection {
    base_url: Url,
    socket_url: Url,
    token: String,
    is_managed: bool,
}

impl ServerConnection {
    /// Create a connection from an HTTP(S) origin and a bearer token
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim()).map_err(|e| {
            BridgeError::config(format!("Invalid server URL '{}': {e}", base_url.trim()))
        })?;
        let socket_url = socket_url_for(&base_url)?;

        Ok(Self {
            base_url,
            socket_url,
            token: token.into(),
            is_managed: false,
        })
    }

    /// Create the connection used inside a managed add-on environment
    pub fn managed(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let mut connection = Self::new(base_url, token)?;
        connection.is_managed = true;
        Ok(connection)
    }

    /// Build a candidate from optional raw parts, returning `None` when it
    /// would not be usable (missing or unparseable URL, empty token).
    pub fn from_parts(base_url: Option<&str>, token: Option<&str>) -> Option<Self> {
        let base_url = base_url.map(str::trim).filter(|u| !u.is_empty())?;
        let token = token.map(str::trim).filter(|t| !t.is_empty())?;

        match Self::new(base_url, token) {
            Ok(connection) => Some(connection),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping server candidate with unusable URL");
                None
            }
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_managed(&self) -> bool {
        self.is_managed
    }

    /// A connection is usable iff both socket URL and token are non-empty
    pub fn is_usable(&self) -> bool {
        !self.socket_url.as_str().is_empty() && !self.token.is_empty()
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("base_url", &self.base_url.as_str())
            .field("socket_url", &self.socket_url.as_str())
            .field("token", &"<redacted>")
            .field("is_managed", &self.is_managed)
            .finish()
    }
}

/// Derive the socket URL from an origin: `http→ws`, `https→wss`, and the
/// socket API path appended exactly once.
pub fn socket_url_for(base_url: &Url) -> Result<Url> {
    let mut socket_url = base_url.clone();

    let scheme = match base_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(BridgeError::config(format!(
                "Unsupported URL scheme for socket connection: {other}"
            )))
        }
    };
    socket_url
        .set_scheme(scheme)
        .map_err(|_| BridgeError::config("Failed to convert server URL to socket URL"))?;

    let trimmed = base_url.path().trim_end_matches('/');
    let path = if trimmed.ends_with(WEBSOCKET_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{WEBSOCKET_PATH}")
    };
    socket_url.set_path(&path);
    socket_url.set_query(None);
    socket_url.set_fragment(None);

    Ok(socket_url)
}
