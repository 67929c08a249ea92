//! Serialized form of a column.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::desc::DescRef;

/// A column in dump form.
///
/// Common fields are typed; kind-specific state (filter, mapping, weights,
/// ...) lives in the flattened `extra` map so each kind owns its keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDump {
    pub id: String,
    pub desc: DescRef,
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_renderer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ColumnDump>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ColumnDump {
    /// Read a kind-specific field, ignoring values of the wrong shape.
    pub fn extra_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        read_extra(&self.extra, key)
    }
}

/// Read `key` from a kind-specific field map. Missing keys, `null` and
/// values of the wrong shape all yield `None`.
pub fn read_extra<T: serde::de::DeserializeOwned>(extra: &Map<String, Value>, key: &str) -> Option<T> {
    match extra.get(key)? {
        Value::Null => None,
        value => match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(target: lineup_core::logging::targets::DUMP, key, error = %e, "ignoring malformed dump field");
                None
            }
        },
    }
}

/// Store `value` under `key`. Values that fail to serialize are skipped.
pub fn write_extra<T: Serialize>(extra: &mut Map<String, Value>, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(v) => {
            extra.insert(key.to_string(), v);
        }
        Err(e) => {
            tracing::warn!(target: lineup_core::logging::targets::DUMP, key, error = %e, "skipping unserializable dump field");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_fields_flatten() {
        let value = json!({
            "id": "col1",
            "desc": "number@score",
            "width": 100,
            "sortMethod": "mean",
            "filter": null
        });
        let dump: ColumnDump = match serde_json::from_value(value) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(dump.desc, DescRef::Ref("number@score".into()));
        assert_eq!(dump.extra_as::<String>("sortMethod").as_deref(), Some("mean"));
        assert_eq!(dump.extra_as::<String>("filter"), None);
        assert_eq!(dump.extra_as::<u32>("sortMethod"), None);
    }
}
