//! Connection resolution across managed environment and configured servers
//!
//! Policy, in order:
//!
//! 1. managed add-on environment with a supervisor token: fixed local endpoint
//! 2. the explicitly selected configuration, if it yields a usable connection
//! 3. the first usable server configuration in enumeration order
//!
//! Nothing here retries or caches; a fresh [`ServerConnection`] is built per
//! resolution.

use super::credentials;
use super::directory::{ConfigDirectory, SERVER_CONFIG_KIND};
use crate::client::ServerConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment variable carrying the supervisor token inside the add-on
pub const SUPERVISOR_TOKEN_ENV: &str = "SUPERVISOR_TOKEN";

/// Origin of Home Assistant as proxied by the supervisor
pub const SUPERVISOR_BASE_URL: &str = "http://supervisor/core";

/// Managed add-on marker, read once at startup
#[derive(Clone, Default)]
pub struct ManagedEnvironment {
    token: Option<String>,
}

impl ManagedEnvironment {
    /// Read the marker from the process environment
    pub fn from_env() -> Self {
        Self {
            token: std::env::var(SUPERVISOR_TOKEN_ENV).ok(),
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Supervisor token, if present and non-empty
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn is_managed(&self) -> bool {
        self.token().is_some()
    }
}

impl std::fmt::Debug for ManagedEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedEnvironment")
            .field("managed", &self.is_managed())
            .finish()
    }
}

/// Resolves which server and credential a query should use
#[derive(Clone)]
pub struct ConnectionResolver {
    directory: Arc<dyn ConfigDirectory>,
    managed: ManagedEnvironment,
}

impl ConnectionResolver {
    pub fn new(directory: Arc<dyn ConfigDirectory>, managed: ManagedEnvironment) -> Self {
        Self { directory, managed }
    }

    pub fn managed(&self) -> &ManagedEnvironment {
        &self.managed
    }

    /// Resolve a usable connection, or `None` when nothing is configured
    pub fn resolve(&self, candidate: Option<&str>) -> Option<ServerConnection> {
        if let Some(token) = self.managed.token() {
            debug!("Using managed add-on endpoint");
            match ServerConnection::managed(SUPERVISOR_BASE_URL, token) {
                Ok(connection) => return Some(connection),
                Err(e) => warn!(error = %e, "Managed endpoint unusable"),
            }
        }

        let candidate = candidate.map(str::trim).filter(|id| !id.is_empty());
        if let Some(id) = candidate {
            if let Some(connection) = self.connection_for(id) {
                debug!(server = id, "Using selected server configuration");
                return Some(connection);
            }
            debug!(server = id, "Selected server configuration unusable, scanning all");
        }

        let found = self
            .directory
            .list_configs(SERVER_CONFIG_KIND)
            .into_iter()
            .find_map(|descriptor| {
                let connection = self.connection_for(&descriptor.id)?;
                debug!(server = %descriptor.id, "Using first usable server configuration");
                Some(connection)
            });

        if found.is_none() {
            debug!("No usable server configuration found");
        }
        found
    }

    fn connection_for(&self, id: &str) -> Option<ServerConnection> {
        let node = self.directory.get_instance(id)?;
        let url = credentials::server_url(node.as_ref());
        let token = credentials::access_token(node.as_ref());
        ServerConnection::from_parts(url.as_deref(), token.as_deref())
            .filter(ServerConnection::is_usable)
    }
}
