use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The specialised checker an agent runs. Each kind shares the lifecycle
/// core and carries its own rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "ssrf_agent")]
    Ssrf,
    #[serde(rename = "sec_mis_agent")]
    SecMis,
}

impl AgentKind {
    /// Tag sent to the authority on every call.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Ssrf => "ssrf_agent",
            AgentKind::SecMis => "sec_mis_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssrf_agent" | "ssrf" => Ok(AgentKind::Ssrf),
            "sec_mis_agent" | "sec_mis" | "misconfig" => Ok(AgentKind::SecMis),
            other => Err(CoreError::Config(format!("unknown agent type '{other}'"))),
        }
    }
}

/// Identity assigned by the authority at registration.
///
/// Immutable once assigned and carried on every later call, deregistration
/// included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub service_id: String,
    pub kind: AgentKind,
}

impl AgentIdentity {
    pub fn new(agent_id: impl Into<String>, service_id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            agent_id: agent_id.into(),
            service_id: service_id.into(),
            kind,
        }
    }
}
