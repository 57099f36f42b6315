//! Rule sync session: keeps exactly one rule subscription alive and feeds
//! every received rule set to the agent's installer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rasp_core::supervise::TaskOutcome;
use rasp_core::{catch_fault, spawn_supervised, AgentIdentity, Shutdown};
use rasp_rules::{MisconfigRules, RuleInstaller, RuleSnapshot, SsrfRules};
use rasp_wire::protocol::NewRules;
use rasp_wire::{AuthorityClient, RuleStream, StreamEvent};

use crate::error::{AgentError, Result};
use crate::health::{HealthMonitor, HealthOutcome};
use crate::state::{ConnectionState, StateCell};

/// Ceiling for the pause between failed receives on a live stream.
pub const MAX_RECV_BACKOFF: Duration = Duration::from_secs(5);

/// Narrow a wire rule set into the typed snapshot the stores install.
pub fn snapshot_from_wire(rules: NewRules) -> RuleSnapshot {
    match rules {
        NewRules::Ssrf {
            ip_rules,
            host_rules,
            regexp_rules,
            scheme_rules,
        } => RuleSnapshot::Ssrf(SsrfRules::new(ip_rules, host_rules, regexp_rules, scheme_rules)),
        NewRules::SecMis {
            ports,
            string_params,
            float_params,
            bool_params,
            int_params,
        } => RuleSnapshot::SecMis(MisconfigRules {
            ports,
            string_params,
            float_params,
            bool_params,
            int_params,
        }),
    }
}

/// Counters describing what the session has done so far.
#[derive(Debug, Default)]
pub struct SyncStats {
    reconnects: AtomicU64,
    installed: AtomicU64,
}

impl SyncStats {
    /// Re-subscription attempts made after the stream ended.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Rule sets successfully installed.
    pub fn installed(&self) -> u64 {
        self.installed.load(Ordering::Acquire)
    }
}

/// Everything a session needs, handed over by the lifecycle manager.
pub struct SessionParts {
    pub client: Arc<dyn AuthorityClient>,
    pub identity: AgentIdentity,
    pub installer: Arc<dyn RuleInstaller>,
    pub health: HealthMonitor,
    pub state: StateCell,
    pub shutdown: Shutdown,
    pub stats: Arc<SyncStats>,
    pub recv_backoff: Duration,
}

/// Handle to a running session.
pub struct RuleSyncSession {
    stats: Arc<SyncStats>,
    handle: JoinHandle<TaskOutcome>,
}

impl RuleSyncSession {
    /// Open the initial subscription and spawn the receive loop. Returns as
    /// soon as the subscription is established.
    pub async fn start(parts: SessionParts) -> Result<Self> {
        let stream = parts
            .client
            .subscribe_rules(&parts.identity)
            .await
            .map_err(AgentError::Subscription)?;
        parts.state.advance(ConnectionState::Streaming);
        info!(agent_id = %parts.identity.agent_id, kind = %parts.identity.kind, "rule sync started");

        let stats = Arc::clone(&parts.stats);
        let handle = spawn_supervised("rule-sync", SyncLoop::from(parts).run(stream));
        Ok(Self { stats, handle })
    }

    pub fn reconnects(&self) -> u64 {
        self.stats.reconnects()
    }

    pub fn installed(&self) -> u64 {
        self.stats.installed()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> TaskOutcome {
        self.handle.await.unwrap_or(TaskOutcome::Aborted)
    }
}

struct SyncLoop {
    client: Arc<dyn AuthorityClient>,
    identity: AgentIdentity,
    installer: Arc<dyn RuleInstaller>,
    health: HealthMonitor,
    state: StateCell,
    shutdown: Shutdown,
    stats: Arc<SyncStats>,
    recv_backoff: Duration,
}

impl From<SessionParts> for SyncLoop {
    fn from(p: SessionParts) -> Self {
        Self {
            client: p.client,
            identity: p.identity,
            installer: p.installer,
            health: p.health,
            state: p.state,
            shutdown: p.shutdown,
            stats: p.stats,
            recv_backoff: p.recv_backoff,
        }
    }
}

impl SyncLoop {
    async fn run(self, mut stream: Box<dyn RuleStream>) {
        let mut backoff = self.recv_backoff;

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = stream.next_event() => event,
            };

            match event {
                StreamEvent::Rules(rules) => {
                    backoff = self.recv_backoff;
                    self.install(rules);
                }
                StreamEvent::Error(e) => {
                    warn!(error = %e, ?backoff, "rule stream receive failed, staying on stream");
                    if self.shutdown.sleep(backoff).await {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_RECV_BACKOFF);
                }
                StreamEvent::Ended => {
                    info!("rule stream ended, waiting for authority health");
                    self.state.advance(ConnectionState::Reconnecting);
                    match self.resubscribe().await {
                        Some(next) => {
                            stream = next;
                            backoff = self.recv_backoff;
                            self.state.advance(ConnectionState::Streaming);
                        }
                        None => break,
                    }
                }
            }
        }

        debug!(agent_id = %self.identity.agent_id, "rule sync loop exited");
    }

    /// Wait for health, then open a fresh subscription. Failed attempts go
    /// back to the health monitor. `None` means cancelled.
    async fn resubscribe(&self) -> Option<Box<dyn RuleStream>> {
        loop {
            if self.health.wait_until_healthy(&self.shutdown).await == HealthOutcome::Cancelled {
                return None;
            }

            self.stats.reconnects.fetch_add(1, Ordering::AcqRel);
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                attempt = self.client.subscribe_rules(&self.identity) => attempt,
            };
            match attempt {
                Ok(stream) => {
                    info!(reconnects = self.stats.reconnects(), "rule stream re-opened");
                    return Some(stream);
                }
                Err(e) => {
                    warn!(error = %e, "re-subscription failed, returning to health polling");
                    // Healthy-but-refusing must not spin.
                    if self.shutdown.sleep(self.health.poll_interval()).await {
                        return None;
                    }
                }
            }
        }
    }

    fn install(&self, rules: NewRules) {
        let kind = rules.kind();
        let snapshot = snapshot_from_wire(rules);
        match catch_fault("rule-install", || self.installer.install(snapshot)) {
            Some(Ok(version)) => {
                self.stats.installed.fetch_add(1, Ordering::AcqRel);
                debug!(%kind, version, "rule set applied");
            }
            Some(Err(e)) => warn!(%kind, error = %e, "rule set rejected"),
            None => {}
        }
    }
}
