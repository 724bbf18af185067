//! Registry query façade
//!
//! Every operation resolves a connection first and fails with a configuration
//! error when none is usable. Multi-query operations fan out concurrently over
//! independent sockets; the first failure fails the operation, except for the
//! label query in [`RegistryService::list_filters`].

pub mod models;
pub mod modes;

pub use models::{
    AreaEntry, DeviceEntry, DeviceFilter, DeviceSummary, DomainCount, EntityEntry, EntityInfo,
    EntitySummary, EntityState, FilterOptions, LabelEntry,
};
pub use modes::{detect_modes, ModeSet};

use crate::client::{commands, HomeAssistantClient, ServerConnection};
use crate::config::ConnectionResolver;
use crate::error::{BridgeError, Result};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Message surfaced when no server connection can be resolved
pub const NO_SERVER_MESSAGE: &str = "No Home Assistant server configured";

/// Queries the Home Assistant registries through a [`HomeAssistantClient`]
#[derive(Clone)]
pub struct RegistryService {
    resolver: ConnectionResolver,
    client: Arc<dyn HomeAssistantClient>,
}

impl RegistryService {
    pub fn new(resolver: ConnectionResolver, client: Arc<dyn HomeAssistantClient>) -> Self {
        Self { resolver, client }
    }

    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    fn connection(&self, server: Option<&str>) -> Result<ServerConnection> {
        self.resolver
            .resolve(server)
            .ok_or_else(|| BridgeError::config(NO_SERVER_MESSAGE))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        connection: &ServerConnection,
        command: &str,
    ) -> Result<Vec<T>> {
        let result = self
            .client
            .call(connection, commands::request(command))
            .await?;
        serde_json::from_value(result).map_err(|e| {
            BridgeError::protocol(format!("Unexpected result shape for {command}: {e}"))
        })
    }

    /// Devices passing every active filter constraint
    pub async fn list_devices(
        &self,
        server: Option<&str>,
        filter: &DeviceFilter,
    ) -> Result<Vec<DeviceSummary>> {
        let connection = self.connection(server)?;
        let (devices, entities) = tokio::try_join!(
            self.fetch::<DeviceEntry>(&connection, commands::DEVICE_REGISTRY_LIST),
            self.fetch::<EntityEntry>(&connection, commands::ENTITY_REGISTRY_LIST),
        )?;

        let mut owned: HashMap<&str, Vec<&EntityEntry>> = HashMap::new();
        for entity in &entities {
            if let Some(device_id) = entity.device_id.as_deref() {
                owned.entry(device_id).or_default().push(entity);
            }
        }

        let summaries: Vec<DeviceSummary> = devices
            .iter()
            .filter(|device| {
                let entities = owned.get(device.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                filter.matches(device, entities)
            })
            .map(DeviceSummary::from)
            .collect();

        debug!(
            total = devices.len(),
            matched = summaries.len(),
            ?filter,
            "Listed devices"
        );
        Ok(summaries)
    }

    /// Entities, optionally restricted to one device
    pub async fn list_entities(
        &self,
        server: Option<&str>,
        device: Option<&str>,
    ) -> Result<Vec<EntitySummary>> {
        let connection = self.connection(server)?;
        let entities: Vec<EntityEntry> = self
            .fetch(&connection, commands::ENTITY_REGISTRY_LIST)
            .await?;

        let device = device.map(str::trim).filter(|d| !d.is_empty());
        let summaries: Vec<EntitySummary> = entities
            .iter()
            .filter(|e| device.map_or(true, |d| e.device_id.as_deref() == Some(d)))
            .map(EntitySummary::from)
            .collect();

        debug!(device, count = summaries.len(), "Listed entities");
        Ok(summaries)
    }

    /// Areas, labels and per-domain entity counts for the editor's filters
    pub async fn list_filters(&self, server: Option<&str>) -> Result<FilterOptions> {
        let connection = self.connection(server)?;

        // Older servers have no label registry
        let labels = async {
            match self
                .fetch::<LabelEntry>(&connection, commands::LABEL_REGISTRY_LIST)
                .await
            {
                Ok(labels) => Ok(labels),
                Err(e) => {
                    warn!(error = %e, "Label registry unavailable, continuing without labels");
                    Ok(Vec::new())
                }
            }
        };

        let (areas, labels, devices, entities) = tokio::try_join!(
            self.fetch::<AreaEntry>(&connection, commands::AREA_REGISTRY_LIST),
            labels,
            self.fetch::<DeviceEntry>(&connection, commands::DEVICE_REGISTRY_LIST),
            self.fetch::<EntityEntry>(&connection, commands::ENTITY_REGISTRY_LIST),
        )?;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entity in &entities {
            *counts.entry(entity.domain()).or_default() += 1;
        }
        let domains = counts
            .into_iter()
            .map(|(domain, count)| DomainCount {
                domain: domain.to_string(),
                count,
            })
            .collect();

        Ok(FilterOptions {
            total_devices: devices.len(),
            areas,
            labels,
            domains,
        })
    }

    /// Live state of one entity; an unknown entity yields no state and no
    /// attributes rather than an error
    pub async fn get_entity_info(&self, server: Option<&str>, entity_id: &str) -> Result<EntityInfo> {
        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return Err(BridgeError::invalid_input("Missing entity"));
        }

        let connection = self.connection(server)?;
        let states: Vec<EntityState> = self.fetch(&connection, commands::GET_STATES).await?;

        let info = match states.into_iter().find(|s| s.entity_id == entity_id) {
            Some(state) => EntityInfo {
                entity_id: state.entity_id,
                state: state.state,
                detected_modes: detect_modes(&state.attributes),
                attributes: state.attributes,
            },
            None => {
                debug!(entity_id, "Entity has no live state");
                EntityInfo {
                    entity_id: entity_id.to_string(),
                    state: None,
                    attributes: Default::default(),
                    detected_modes: ModeSet::new(),
                }
            }
        };

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManagedEnvironment, ServerEntry, StaticDirectory};
    use crate::error::ErrorKind;
    use crate::mock::MockHomeAssistantClient;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn service(client: MockHomeAssistantClient) -> RegistryService {
        let servers = vec![ServerEntry {
            id: "ha".into(),
            name: "Home".into(),
            url: Some("http://ha:8123".into()),
            token: Some("token".into()),
            fields: Default::default(),
        }];
        let resolver = ConnectionResolver::new(
            Arc::new(StaticDirectory::new(servers)),
            ManagedEnvironment::default(),
        );
        RegistryService::new(resolver, Arc::new(client))
    }

    fn registry_client() -> MockHomeAssistantClient {
        MockHomeAssistantClient::new()
            .with_result(
                commands::DEVICE_REGISTRY_LIST,
                json!([
                    {"id": "d1", "area_id": "kitchen", "name": "Ceiling"},
                    {"id": "d2", "area_id": null, "manufacturer": "Acme", "model": "Plug"}
                ]),
            )
            .with_result(
                commands::ENTITY_REGISTRY_LIST,
                json!([
                    {"device_id": "d1", "entity_id": "light.x", "area_id": "kitchen", "labels": ["fav"]},
                    {"device_id": "d2", "entity_id": "switch.plug", "area_id": "office", "labels": []},
                    {"device_id": null, "entity_id": "sun.sun", "labels": null}
                ]),
            )
    }

    #[rstest]
    #[case(Some("kitchen"), None, None, vec!["d1"])]
    #[case(None, Some("other"), None, vec![])]
    #[case(None, None, Some("switch"), vec!["d2"])]
    #[case(None, None, Some("light"), vec!["d1"])]
    #[case(Some("kitchen"), Some("fav"), Some("light"), vec!["d1"])]
    #[case(Some("office"), None, Some("light"), vec![])]
    #[case(Some("office"), None, None, vec!["d2"])]
    #[case(None, None, None, vec!["d1", "d2"])]
    #[tokio::test]
    async fn test_list_devices_filters(
        #[case] area: Option<&str>,
        #[case] label: Option<&str>,
        #[case] domain: Option<&str>,
        #[case] expected: Vec<&str>,
    ) {
        let service = service(registry_client());
        let devices = service
            .list_devices(None, &DeviceFilter::new(area, label, domain))
            .await
            .unwrap();
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_list_devices_display_names() {
        let devices = service(registry_client())
            .list_devices(Some("ha"), &DeviceFilter::default())
            .await
            .unwrap();
        assert_eq!(devices[0].display_name, "Ceiling");
        assert_eq!(devices[1].display_name, "Acme Plug");
        assert_eq!(devices[1].name, None);
    }

    #[tokio::test]
    async fn test_list_entities_by_device() {
        let service = service(registry_client());
        let entities = service.list_entities(None, Some("d2")).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id, "switch.plug");

        let all = service.list_entities(None, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_filters_tolerates_missing_label_registry() {
        let client = registry_client()
            .with_result(
                commands::AREA_REGISTRY_LIST,
                json!([{"area_id": "kitchen", "name": "Kitchen", "picture": null}]),
            )
            .with_error(
                commands::LABEL_REGISTRY_LIST,
                BridgeError::command("Unknown command."),
            );

        let filters = service(client).list_filters(None).await.unwrap();
        assert_eq!(filters.total_devices, 2);
        assert_eq!(
            filters.areas,
            vec![AreaEntry {
                area_id: "kitchen".into(),
                name: "Kitchen".into()
            }]
        );
        assert!(filters.labels.is_empty());
        let domains: Vec<_> = filters
            .domains
            .iter()
            .map(|d| (d.domain.as_str(), d.count))
            .collect();
        assert_eq!(domains, vec![("light", 1), ("sun", 1), ("switch", 1)]);
    }

    #[tokio::test]
    async fn test_list_filters_fails_when_other_query_fails() {
        let client = registry_client()
            .with_error(commands::AREA_REGISTRY_LIST, BridgeError::timeout("no answer"))
            .with_result(commands::LABEL_REGISTRY_LIST, json!([]));

        let err = service(client).list_filters(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_get_entity_info() {
        let client = MockHomeAssistantClient::new().with_result(
            commands::GET_STATES,
            json!([
                {"entity_id": "climate.den", "state": "heat",
                 "attributes": {"hvac_modes": ["heat", "off"], "temperature": 21}},
            ]),
        );
        let service = service(client);

        let info = service.get_entity_info(None, "climate.den").await.unwrap();
        assert_eq!(info.state.as_deref(), Some("heat"));
        assert_eq!(info.attributes["temperature"], json!(21));
        assert_eq!(
            info.detected_modes.get("hvac_modes").unwrap(),
            &vec!["heat".to_string(), "off".to_string()]
        );

        let missing = service.get_entity_info(None, "light.none").await.unwrap();
        assert_eq!(missing.entity_id, "light.none");
        assert!(missing.state.is_none());
        assert!(missing.attributes.is_empty());
        assert!(missing.detected_modes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entity_is_invalid_input() {
        let err = service(MockHomeAssistantClient::new())
            .get_entity_info(None, " ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_no_server_is_configuration_error() {
        let resolver = ConnectionResolver::new(
            Arc::new(StaticDirectory::new(vec![])),
            ManagedEnvironment::default(),
        );
        let service = RegistryService::new(resolver, Arc::new(MockHomeAssistantClient::new()));

        let err = service.list_filters(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.kind().http_status(), 400);
    }

    #[tokio::test]
    async fn test_calls_use_resolved_connection() {
        let client = Arc::new(registry_client());
        let resolver = ConnectionResolver::new(
            Arc::new(StaticDirectory::new(vec![])),
            ManagedEnvironment::with_token("sv"),
        );
        let service = RegistryService::new(resolver, client.clone());

        service.list_entities(None, None).await.unwrap();
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ws://supervisor/core/api/websocket");
        assert_eq!(calls[0].1, json!({"type": "config/entity_registry/list"}));
    }
}
