//! Concrete agent kinds layered on the shared lifecycle.

mod misconfig;
mod ssrf;

pub use misconfig::{MisconfigAgent, ScanRound};
pub use ssrf::SsrfAgent;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use rasp_core::supervise::TaskOutcome;
use rasp_core::{AgentIdentity, AgentKind};
use rasp_rules::{load_seed_file, RuleInstaller};

use crate::error::Result;
use crate::lifecycle::AgentLifecycle;

/// What every agent kind provides on top of [`AgentLifecycle`]: its rule
/// installer and the background engines it runs.
#[async_trait]
pub trait RaspAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn lifecycle(&self) -> &AgentLifecycle;

    fn installer(&self) -> Arc<dyn RuleInstaller>;

    /// Spawn the kind's periodic or one-shot detection work. Every task
    /// observes the lifecycle's shutdown signal.
    fn spawn_engines(&self) -> Vec<JoinHandle<TaskOutcome>>;

    /// Install a local rule snapshot ahead of the first sync message.
    fn seed(&self, path: &Path) -> Result<u64> {
        let snapshot = load_seed_file(path)?;
        Ok(self.installer().install(snapshot)?)
    }

    async fn start(&self, agent_name: &str, service_id: &str) -> Result<AgentIdentity> {
        self.lifecycle()
            .register(agent_name, service_id, self.kind(), self.installer())
            .await
    }

    async fn shutdown(&self, reason: &str) {
        self.lifecycle().shutdown(reason).await;
    }
}
