//! The capability the rule sync session hands decoded snapshots to.

use tracing::info;

use rasp_core::AgentKind;

use crate::error::{Result, RuleError};
use crate::misconfig::MisconfigRules;
use crate::snapshot::RuleSnapshot;
use crate::ssrf::SsrfRules;
use crate::store::RuleStore;

/// Narrows a generic snapshot into one agent kind's typed rule table and
/// installs it.
pub trait RuleInstaller: Send + Sync {
    /// The agent kind this installer accepts snapshots for.
    fn kind(&self) -> AgentKind;

    /// Install the snapshot wholesale. Returns the store version after the
    /// install. A snapshot for a different kind is rejected and leaves the
    /// current rules untouched.
    fn install(&self, snapshot: RuleSnapshot) -> Result<u64>;
}

impl RuleInstaller for RuleStore<SsrfRules> {
    fn kind(&self) -> AgentKind {
        AgentKind::Ssrf
    }

    fn install(&self, snapshot: RuleSnapshot) -> Result<u64> {
        match snapshot {
            RuleSnapshot::Ssrf(rules) => {
                let entries = rules.len();
                let version = self.replace(rules);
                info!(version, entries, "installed ssrf rules");
                Ok(version)
            }
            other => Err(RuleError::KindMismatch {
                expected: AgentKind::Ssrf,
                got: other.kind(),
            }),
        }
    }
}

impl RuleInstaller for RuleStore<MisconfigRules> {
    fn kind(&self) -> AgentKind {
        AgentKind::SecMis
    }

    fn install(&self, snapshot: RuleSnapshot) -> Result<u64> {
        match snapshot {
            RuleSnapshot::SecMis(rules) => {
                let params = rules.param_count();
                let ports = rules.ports.len();
                let version = self.replace(rules);
                info!(version, params, ports, "installed misconfiguration rules");
                Ok(version)
            }
            other => Err(RuleError::KindMismatch {
                expected: AgentKind::SecMis,
                got: other.kind(),
            }),
        }
    }
}
