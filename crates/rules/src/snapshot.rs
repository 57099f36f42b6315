//! The wholesale unit of rule replacement.

use rasp_core::AgentKind;

use crate::misconfig::MisconfigRules;
use crate::ssrf::SsrfRules;

/// A complete, self-contained rule set for one agent kind.
#[derive(Debug, Clone)]
pub enum RuleSnapshot {
    Ssrf(SsrfRules),
    SecMis(MisconfigRules),
}

impl RuleSnapshot {
    pub fn kind(&self) -> AgentKind {
        match self {
            RuleSnapshot::Ssrf(_) => AgentKind::Ssrf,
            RuleSnapshot::SecMis(_) => AgentKind::SecMis,
        }
    }

    pub fn as_ssrf(&self) -> Option<&SsrfRules> {
        match self {
            RuleSnapshot::Ssrf(rules) => Some(rules),
            _ => None,
        }
    }

    pub fn as_misconfig(&self) -> Option<&MisconfigRules> {
        match self {
            RuleSnapshot::SecMis(rules) => Some(rules),
            _ => None,
        }
    }
}
