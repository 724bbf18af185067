//! URL and token extraction from server configuration nodes
//!
//! Sources are tried in table order; the first non-empty string wins.
//!
//! | order | source        | URL path           | token path                 |
//! |-------|---------------|--------------------|----------------------------|
//! | 1     | accessor      | `base_url()`       | `access_token()`           |
//! | 2     | direct field  | `credentials.host` | `credentials.access_token` |
//! | 3     | nested config | `config.server`    | `config.access_token`      |
//! | 4     | nested client | `client.url`       | `client.token`             |

use super::directory::ServerNodeHandle;
use tracing::trace;

/// One entry of an extraction table
pub struct FieldSource {
    pub label: &'static str,
    pub extract: fn(&dyn ServerNodeHandle) -> Option<String>,
}

pub const URL_SOURCES: &[FieldSource] = &[
    FieldSource {
        label: "accessor",
        extract: |node| node.base_url(),
    },
    FieldSource {
        label: "credentials.host",
        extract: |node| string_at(node, &["credentials", "host"]),
    },
    FieldSource {
        label: "config.server",
        extract: |node| string_at(node, &["config", "server"]),
    },
    FieldSource {
        label: "client.url",
        extract: |node| string_at(node, &["client", "url"]),
    },
];

pub const TOKEN_SOURCES: &[FieldSource] = &[
    FieldSource {
        label: "accessor",
        extract: |node| node.access_token(),
    },
    FieldSource {
        label: "credentials.access_token",
        extract: |node| string_at(node, &["credentials", "access_token"]),
    },
    FieldSource {
        label: "config.access_token",
        extract: |node| string_at(node, &["config", "access_token"]),
    },
    FieldSource {
        label: "client.token",
        extract: |node| string_at(node, &["client", "token"]),
    },
];

fn string_at(node: &dyn ServerNodeHandle, path: &[&str]) -> Option<String> {
    node.field(path)?.as_str().map(str::to_string)
}

/// First non-empty value produced by the sources, in order
pub fn extract_first(node: &dyn ServerNodeHandle, sources: &[FieldSource]) -> Option<String> {
    sources.iter().find_map(|source| {
        let value = (source.extract)(node)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())?;
        trace!(node_id = node.id(), source = source.label, "Extracted field");
        Some(value)
    })
}

/// Server origin of a configuration node
pub fn server_url(node: &dyn ServerNodeHandle) -> Option<String> {
    extract_first(node, URL_SOURCES)
}

/// Bearer token of a configuration node
pub fn access_token(node: &dyn ServerNodeHandle) -> Option<String> {
    extract_first(node, TOKEN_SOURCES)
}
