use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A parsed configuration document: mappings, sequences and scalars.
///
/// Produced from JSON or YAML sources so detection code matches on the tag
/// instead of probing dynamic values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Sequence(Vec<ConfigValue>),
    /// Entries in document order.
    Mapping(Vec<(String, ConfigValue)>),
    Null,
}

impl ConfigValue {
    /// Look up a key in a mapping (first match).
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Mapping(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| CoreError::Document(e.to_string()))?;
        Ok(Self::from(value))
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(s).map_err(|e| CoreError::Document(e.to_string()))?;
        Ok(Self::from(value))
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Integer(i),
                None => n.as_f64().map(ConfigValue::Float).unwrap_or(ConfigValue::Null),
            },
            Value::String(s) => ConfigValue::String(s),
            Value::Array(items) => ConfigValue::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                ConfigValue::Mapping(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<serde_yaml::Value> for ConfigValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Integer(i),
                None => n.as_f64().map(ConfigValue::Float).unwrap_or(ConfigValue::Null),
            },
            Value::String(s) => ConfigValue::String(s),
            Value::Sequence(items) => {
                ConfigValue::Sequence(items.into_iter().map(Self::from).collect())
            }
            Value::Mapping(map) => ConfigValue::Mapping(
                map.into_iter()
                    .filter_map(|(k, v)| yaml_key(k).map(|k| (k, Self::from(v))))
                    .collect(),
            ),
            Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

/// Scalar YAML keys become strings; complex keys are dropped.
fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match key {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A document together with the place it came from.
#[derive(Debug, Clone)]
pub struct NamedDocument {
    pub source: String,
    pub root: ConfigValue,
}

impl NamedDocument {
    pub fn new(source: impl Into<String>, root: ConfigValue) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }
}
