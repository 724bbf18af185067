//! Configuration management for the bridge
//!
//! Configuration is layered with the `config` crate: built-in defaults, then
//! an optional TOML file, then `ECHO_HA__*` environment variables
//! (e.g. `ECHO_HA__HTTP__PORT=1881`).

pub mod credentials;
pub mod directory;
pub mod resolver;

pub use directory::{ConfigDescriptor, ConfigDirectory, ServerNodeHandle, StaticDirectory};
pub use resolver::{ConnectionResolver, ManagedEnvironment};

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ECHO_HA";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Admin HTTP server
    pub http: HttpConfig,

    /// Socket client settings
    pub client: ClientConfig,

    /// Home Assistant server configuration nodes
    pub servers: Vec<ServerEntry>,

    /// Echo device nodes and their linkage
    pub devices: Vec<DeviceLinkage>,

    /// Echo hub nodes
    pub hubs: Vec<HubConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the admin endpoints, e.g. `/echo-ha`
    pub admin_prefix: String,
}

/// Socket client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bound on a single call, handshake included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// One Home Assistant server configuration node.
///
/// Besides `url` and `token`, any legacy fields (`credentials`, `config`,
/// `client` tables) are kept verbatim for the credential extractors.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl std::fmt::Debug for ServerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Persisted linkage between an echo device node and a Home Assistant
/// device/entity. The camelCase names written by the flow editor are
/// accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceLinkage {
    /// Instance id of the node
    #[serde(default = "new_node_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "serverConfigId")]
    pub server_config_id: Option<String>,

    #[serde(default, alias = "areaId")]
    pub area_id: Option<String>,

    #[serde(default, alias = "labelId")]
    pub label_id: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default, alias = "deviceId", alias = "haDeviceId", alias = "ha_device_id")]
    pub device_id: Option<String>,

    #[serde(default, alias = "entityId", alias = "haEntityId", alias = "ha_entity_id")]
    pub entity_id: Option<String>,

    /// Identifier matched against the inbound `deviceid`; defaults to `id`
    #[serde(default, alias = "ownDeviceIdentifier")]
    pub own_device_identifier: Option<String>,
}

/// Echo hub node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "new_node_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_hub_port")]
    pub port: u16,

    /// Ids of the echo device nodes announced by this hub
    #[serde(default)]
    pub devices: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Log to a daily rolling file (path)
    pub file: Option<String>,
}

fn new_node_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_hub_port() -> u16 {
    80
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1880,
            admin_prefix: "/echo-ha".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: crate::client::DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: None,
        }
    }
}

impl ServerConfig {
    /// Default configuration file location, if one exists
    pub fn default_path() -> Option<PathBuf> {
        let path = dirs::config_dir()?.join("echo-ha-bridge").join("config.toml");
        path.exists().then_some(path)
    }

    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(file).required(true));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.http.admin_prefix.starts_with('/') {
            return Err(BridgeError::config(format!(
                "admin_prefix must start with '/': {}",
                self.http.admin_prefix
            )));
        }

        if self.client.request_timeout.is_zero() {
            return Err(BridgeError::config("request_timeout must be greater than zero"));
        }

        let mut seen = HashSet::new();
        let node_ids = self
            .devices
            .iter()
            .map(|d| d.id.as_str())
            .chain(self.hubs.iter().map(|h| h.id.as_str()));
        for id in node_ids {
            if !seen.insert(id) {
                return Err(BridgeError::config(format!("Duplicate node id: {id}")));
            }
        }

        let mut server_ids = HashSet::new();
        for server in &self.servers {
            if !server_ids.insert(server.id.as_str()) {
                return Err(BridgeError::config(format!(
                    "Duplicate server id: {}",
                    server.id
                )));
            }
        }

        Ok(())
    }
}
