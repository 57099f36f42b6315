use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use rasp_core::supervise::TaskOutcome;
use rasp_core::AgentKind;
use rasp_detect::{EgressChecker, Finding};
use rasp_rules::{RuleInstaller, RuleStore, SsrfRules};

use super::RaspAgent;
use crate::lifecycle::AgentLifecycle;

/// Egress agent: checks outbound targets against the SSRF blacklist.
pub struct SsrfAgent {
    lifecycle: AgentLifecycle,
    store: Arc<RuleStore<SsrfRules>>,
    egress: EgressChecker,
}

impl SsrfAgent {
    pub fn new(lifecycle: AgentLifecycle) -> Self {
        let store = Arc::new(RuleStore::default());
        let egress = EgressChecker::new(Arc::clone(&store));
        Self {
            lifecycle,
            store,
            egress,
        }
    }

    pub fn store(&self) -> &Arc<RuleStore<SsrfRules>> {
        &self.store
    }

    pub fn egress(&self) -> &EgressChecker {
        &self.egress
    }

    /// Check an outbound URL and log any violation.
    pub fn check_outbound(&self, url: &str) -> Option<Finding> {
        self.egress.inspect(url)
    }
}

#[async_trait]
impl RaspAgent for SsrfAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Ssrf
    }

    fn lifecycle(&self) -> &AgentLifecycle {
        &self.lifecycle
    }

    fn installer(&self) -> Arc<dyn RuleInstaller> {
        self.store.clone()
    }

    // Egress checks run on demand from the host application.
    fn spawn_engines(&self) -> Vec<JoinHandle<TaskOutcome>> {
        Vec::new()
    }
}
