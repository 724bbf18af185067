//! Read-only directory of configured server nodes
//!
//! The flow host owns the configuration nodes; the resolver only needs to
//! enumerate them by kind and look one up by id. [`StaticDirectory`] serves
//! the entries from the bridge's own configuration file.

use super::ServerEntry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Kind of the configuration nodes holding Home Assistant connections
pub const SERVER_CONFIG_KIND: &str = "server";

/// Enumeration entry for one configuration node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDescriptor {
    pub id: String,
    pub kind: String,
    pub name: String,
}

/// Structural capability of a server configuration node.
///
/// Config nodes have changed shape across host versions, so besides the
/// accessors every node exposes its raw fields for path lookups.
pub trait ServerNodeHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Accessor for the server origin, if the node provides one
    fn base_url(&self) -> Option<String> {
        None
    }

    /// Accessor for the bearer token, if the node provides one
    fn access_token(&self) -> Option<String> {
        None
    }

    /// Raw field lookup by path, e.g. `["config", "server"]`
    fn field(&self, _path: &[&str]) -> Option<&Value> {
        None
    }
}

/// Directory of live configuration nodes
pub trait ConfigDirectory: Send + Sync {
    /// All configuration entries of the given kind, in enumeration order
    fn list_configs(&self, kind: &str) -> Vec<ConfigDescriptor>;

    /// Live handle for a configuration id
    fn get_instance(&self, id: &str) -> Option<Arc<dyn ServerNodeHandle>>;
}

impl ServerNodeHandle for ServerEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn base_url(&self) -> Option<String> {
        self.url.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.fields.get(*first)?;
        for key in rest {
            value = value.get(*key)?;
        }
        Some(value)
    }
}

/// Directory backed by the server entries of the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    servers: Vec<Arc<ServerEntry>>,
}

impl StaticDirectory {
    pub fn new(servers: Vec<ServerEntry>) -> Self {
        Self {
            servers: servers.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl ConfigDirectory for StaticDirectory {
    fn list_configs(&self, kind: &str) -> Vec<ConfigDescriptor> {
        if kind != SERVER_CONFIG_KIND {
            return Vec::new();
        }
        self.servers
            .iter()
            .map(|server| ConfigDescriptor {
                id: server.id.clone(),
                kind: SERVER_CONFIG_KIND.to_string(),
                name: server.name.clone(),
            })
            .collect()
    }

    fn get_instance(&self, id: &str) -> Option<Arc<dyn ServerNodeHandle>> {
        self.servers
            .iter()
            .find(|server| server.id == id)
            .map(|server| Arc::clone(server) as Arc<dyn ServerNodeHandle>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, fields: Value) -> ServerEntry {
        ServerEntry {
            id: id.to_string(),
            name: format!("{id} name"),
            url: None,
            token: None,
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_list_configs_preserves_order_and_filters_kind() {
        let directory = StaticDirectory::new(vec![
            entry("b", json!({})),
            entry("a", json!({})),
        ]);

        let ids: Vec<_> = directory
            .list_configs(SERVER_CONFIG_KIND)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(directory.list_configs("mqtt-broker").is_empty());
    }

    #[test]
    fn test_field_walks_nested_paths() {
        let server = entry("s", json!({"config": {"server": "http://h:8123"}}));
        assert_eq!(
            server.field(&["config", "server"]),
            Some(&json!("http://h:8123"))
        );
        assert!(server.field(&["config", "missing"]).is_none());
        assert!(server.field(&[]).is_none());
    }

    #[test]
    fn test_get_instance_by_id() {
        let directory = StaticDirectory::new(vec![entry("s1", json!({}))]);
        assert_eq!(directory.get_instance("s1").unwrap().id(), "s1");
        assert!(directory.get_instance("s2").is_none());
    }
}
