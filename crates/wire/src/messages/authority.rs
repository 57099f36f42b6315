//! Request / response payloads exchanged with the authority.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rasp_core::{AgentIdentity, AgentKind};

/// Registration request. The authority answers with [`RegAgentResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegAgentRequest {
    pub agent_name: String,
    pub service_id: String,
    pub agent_type: AgentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegAgentResponse {
    pub agent_id: String,
    pub detail: String,
}

/// Addresses an already-registered agent (deregistration, rule sync).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
    pub agent_type: AgentKind,
}

impl From<&AgentIdentity> for AgentRequest {
    fn from(identity: &AgentIdentity) -> Self {
        Self {
            agent_id: identity.agent_id.clone(),
            agent_type: identity.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

/// Carried by `*.error` replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// One item of the rule subscription: a complete rule set for one agent kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NewRules {
    Ssrf {
        #[serde(default)]
        ip_rules: Vec<String>,
        #[serde(default)]
        host_rules: Vec<String>,
        #[serde(default)]
        regexp_rules: Vec<String>,
        #[serde(default)]
        scheme_rules: Vec<String>,
    },
    SecMis {
        #[serde(default)]
        ports: Vec<u16>,
        #[serde(default)]
        string_params: HashMap<String, String>,
        #[serde(default)]
        float_params: HashMap<String, f64>,
        #[serde(default)]
        bool_params: HashMap<String, bool>,
        #[serde(default)]
        int_params: HashMap<String, i64>,
    },
}

impl NewRules {
    pub fn kind(&self) -> AgentKind {
        match self {
            NewRules::Ssrf { .. } => AgentKind::Ssrf,
            NewRules::SecMis { .. } => AgentKind::SecMis,
        }
    }
}
