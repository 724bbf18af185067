//! Registry records as returned by Home Assistant, and the display-ready
//! projections served to the editor

use super::modes::ModeSet;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Registry rows written by older integrations carry explicit nulls
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Device registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,

    /// Name reported by the integration
    #[serde(default)]
    pub name: Option<String>,

    /// User-assigned name
    #[serde(default)]
    pub name_by_user: Option<String>,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub area_id: Option<String>,
}

/// Entity registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub area_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,

    /// User-assigned name
    #[serde(default)]
    pub name: Option<String>,

    /// Name reported by the integration
    #[serde(default)]
    pub original_name: Option<String>,
}

/// Area registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Label registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Live state of one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Domain part of an entity id (`light` for `light.kitchen`)
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id.split('.').next().unwrap_or(entity_id)
}

impl DeviceEntry {
    /// User name, then integration name
    pub fn name(&self) -> Option<&str> {
        non_empty(self.name_by_user.as_deref()).or_else(|| non_empty(self.name.as_deref()))
    }

    /// Name shown in the editor; never empty.
    ///
    /// Precedence: user name, integration name, "manufacturer model", id.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_string();
        }

        let maker = [self.manufacturer.as_deref(), self.model.as_deref()]
            .into_iter()
            .filter_map(non_empty)
            .collect::<Vec<_>>()
            .join(" ");
        if !maker.is_empty() {
            return maker;
        }

        self.id.clone()
    }
}

impl EntityEntry {
    /// User name, then integration name
    pub fn name(&self) -> Option<&str> {
        non_empty(self.name.as_deref()).or_else(|| non_empty(self.original_name.as_deref()))
    }

    /// Name shown in the editor; never empty
    pub fn display_name(&self) -> String {
        self.name()
            .map(str::to_string)
            .unwrap_or_else(|| self.entity_id.clone())
    }

    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Display record for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl From<&DeviceEntry> for DeviceSummary {
    fn from(device: &DeviceEntry) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name().map(str::to_string),
            display_name: device.display_name(),
        }
    }
}

/// Display record for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl From<&EntityEntry> for EntitySummary {
    fn from(entity: &EntityEntry) -> Self {
        Self {
            entity_id: entity.entity_id.clone(),
            name: entity.name().map(str::to_string),
            display_name: entity.display_name(),
        }
    }
}

/// Number of entities per domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

/// Filter choices offered by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub total_devices: usize,
    pub areas: Vec<AreaEntry>,
    pub labels: Vec<LabelEntry>,
    pub domains: Vec<DomainCount>,
}

/// Live state of one entity with its detected mode lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_id: String,
    pub state: Option<String>,
    pub attributes: Map<String, Value>,
    pub detected_modes: ModeSet,
}

/// Conjunctive device filter; absent fields do not constrain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub area: Option<String>,
    pub label: Option<String>,
    pub domain: Option<String>,
}

impl DeviceFilter {
    /// Build a filter, treating empty strings as absent
    pub fn new(area: Option<&str>, label: Option<&str>, domain: Option<&str>) -> Self {
        Self {
            area: non_empty(area).map(str::to_string),
            label: non_empty(label).map(str::to_string),
            domain: non_empty(domain).map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_none() && self.label.is_none() && self.domain.is_none()
    }

    /// Whether a device and the entities it owns pass every active constraint
    pub fn matches(&self, device: &DeviceEntry, entities: &[&EntityEntry]) -> bool {
        if let Some(area) = &self.area {
            let in_area = device.area_id.as_deref() == Some(area.as_str())
                || entities
                    .iter()
                    .any(|e| e.area_id.as_deref() == Some(area.as_str()));
            if !in_area {
                return false;
            }
        }

        if let Some(label) = &self.label {
            if !entities.iter().any(|e| e.has_label(label)) {
                return false;
            }
        }

        if let Some(domain) = &self.domain {
            if !entities.iter().any(|e| e.domain() == domain) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn device(value: Value) -> DeviceEntry {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(json!({"id": "d", "name_by_user": "Mine", "name": "Theirs", "manufacturer": "Acme", "model": "X1"}), "Mine")]
    #[case(json!({"id": "d", "manufacturer": "Acme", "name_by_user": "Mine"}), "Mine")]
    #[case(json!({"id": "d", "name": "Theirs", "manufacturer": "Acme", "model": "X1"}), "Theirs")]
    #[case(json!({"id": "d", "name": "", "manufacturer": "Acme", "model": "X1"}), "Acme X1")]
    #[case(json!({"id": "d", "model": "X1"}), "X1")]
    #[case(json!({"id": "d", "name": null, "name_by_user": null}), "d")]
    fn test_device_display_name_precedence(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(device(raw).display_name(), expected);
    }

    #[test]
    fn test_entity_display_name_precedence() {
        let entity: EntityEntry = serde_json::from_value(json!({
            "entity_id": "light.x", "name": null, "original_name": "Ceiling"
        }))
        .unwrap();
        assert_eq!(entity.display_name(), "Ceiling");

        let entity: EntityEntry = serde_json::from_value(json!({
            "entity_id": "light.x", "name": "Desk", "original_name": "Ceiling"
        }))
        .unwrap();
        assert_eq!(entity.display_name(), "Desk");

        let entity: EntityEntry =
            serde_json::from_value(json!({"entity_id": "light.x"})).unwrap();
        assert_eq!(entity.display_name(), "light.x");
    }

    #[test]
    fn test_explicit_nulls_read_as_empty() {
        let entity: EntityEntry = serde_json::from_value(json!({
            "entity_id": "light.x", "device_id": "d1", "labels": null
        }))
        .unwrap();
        assert!(entity.labels.is_empty());
        assert!(!entity.has_label("fav"));

        let label: LabelEntry =
            serde_json::from_value(json!({"label_id": "fav", "name": null})).unwrap();
        assert_eq!(label.name, "");
    }

    #[test]
    fn test_entity_domain() {
        assert_eq!(entity_domain("light.kitchen"), "light");
        assert_eq!(entity_domain("sensor.a.b"), "sensor");
        assert_eq!(entity_domain("nodot"), "nodot");
    }

    #[test]
    fn test_summary_serializes_display_name_camel_case() {
        let summary = DeviceSummary::from(&device(json!({"id": "d1", "name": "Lamp"})));
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value, json!({"id": "d1", "name": "Lamp", "displayName": "Lamp"}));
    }

    #[test]
    fn test_empty_filter_values_are_absent() {
        let filter = DeviceFilter::new(Some(""), Some("  "), None);
        assert!(filter.is_empty());
    }
}
