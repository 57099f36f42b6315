//! Misconfiguration tables: weak configuration values and sensitive ports.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Config key -> known-weak value, partitioned by value kind, plus the
/// ports that must not be listening.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MisconfigRules {
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub string_params: HashMap<String, String>,
    #[serde(default)]
    pub float_params: HashMap<String, f64>,
    #[serde(default)]
    pub bool_params: HashMap<String, bool>,
    #[serde(default)]
    pub int_params: HashMap<String, i64>,
}

impl MisconfigRules {
    pub fn param_count(&self) -> usize {
        self.string_params.len() + self.float_params.len() + self.bool_params.len() + self.int_params.len()
    }
}
