//! Mode list detection from entity attributes

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Attribute key → mode values, in first-seen order
pub type ModeSet = IndexMap<String, Vec<String>>;

/// Attribute keys checked first, in this order
pub const KNOWN_MODE_KEYS: &[&str] = &[
    "hvac_modes",
    "preset_modes",
    "fan_modes",
    "swing_modes",
    "speed_list",
    "effect_list",
    "source_list",
    "supported_color_modes",
    "modes",
];

/// Whether an attribute key looks like a mode list (`*_modes`, `*_list`)
pub fn is_mode_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.ends_with("_modes") || key.ends_with("_list")
}

fn mode_values(value: &Value) -> Option<Vec<String>> {
    let values: Vec<String> = value
        .as_array()?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect();
    (!values.is_empty()).then_some(values)
}

/// Collect the non-empty mode lists of an attribute set.
///
/// Known keys come first; any other `*_modes` / `*_list` key follows in
/// attribute order. A key never appears twice.
pub fn detect_modes(attributes: &Map<String, Value>) -> ModeSet {
    let mut modes = ModeSet::new();

    for key in KNOWN_MODE_KEYS {
        if let Some(values) = attributes.get(*key).and_then(mode_values) {
            modes.insert((*key).to_string(), values);
        }
    }

    for (key, value) in attributes {
        if modes.contains_key(key) || !is_mode_key(key) {
            continue;
        }
        if let Some(values) = mode_values(value) {
            modes.insert(key.clone(), values);
        }
    }

    modes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_known_and_custom_keys() {
        let modes = detect_modes(&attrs(json!({
            "hvac_modes": ["heat", "cool"],
            "custom_foo_list": ["x"],
            "empty_modes": []
        })));

        let expected: ModeSet = [
            ("hvac_modes".to_string(), vec!["heat".to_string(), "cool".to_string()]),
            ("custom_foo_list".to_string(), vec!["x".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(modes, expected);
    }

    #[test]
    fn test_known_keys_come_first() {
        let modes = detect_modes(&attrs(json!({
            "aaa_list": ["a"],
            "fan_modes": ["low", "high"],
            "preset_modes": ["eco"]
        })));
        let keys: Vec<_> = modes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["preset_modes", "fan_modes", "aaa_list"]);
    }

    #[test]
    fn test_suffix_match_is_case_insensitive_and_values_must_be_lists() {
        let modes = detect_modes(&attrs(json!({
            "Sound_Mode_LIST": ["movie"],
            "friendly_name_list": "not a list",
            "brightness": 255,
            "speed_list": [1, 2]
        })));
        assert_eq!(modes.get("Sound_Mode_LIST").unwrap(), &vec!["movie".to_string()]);
        assert_eq!(modes.get("speed_list").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert!(!modes.contains_key("friendly_name_list"));
        assert_eq!(modes.len(), 2);
    }

    #[test]
    fn test_no_attributes_yield_empty_set() {
        assert!(detect_modes(&Map::new()).is_empty());
    }
}
