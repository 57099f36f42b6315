//! Agent lifecycle: registration, rule sync startup and orderly shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use rasp_core::{AgentIdentity, AgentKind, Shutdown};
use rasp_rules::RuleInstaller;
use rasp_wire::AuthorityClient;

use crate::error::{AgentError, Result};
use crate::health::HealthMonitor;
use crate::state::{ConnectionState, StateCell};
use crate::sync::{RuleSyncSession, SessionParts, SyncStats};

/// How long shutdown waits for the sync loop to wind down before moving on
/// to deregistration.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the authority connection and the agent's identity.
pub struct AgentLifecycle {
    client: Arc<dyn AuthorityClient>,
    health: HealthMonitor,
    shutdown: Shutdown,
    recv_backoff: Duration,
    state: StateCell,
    identity: OnceLock<AgentIdentity>,
    stats: Arc<SyncStats>,
    session: Mutex<Option<RuleSyncSession>>,
    closing: AtomicBool,
}

impl AgentLifecycle {
    pub fn new(client: Arc<dyn AuthorityClient>, health: HealthMonitor, shutdown: Shutdown) -> Self {
        Self {
            client,
            health,
            shutdown,
            recv_backoff: Duration::from_millis(100),
            state: StateCell::new(),
            identity: OnceLock::new(),
            stats: Arc::new(SyncStats::default()),
            session: Mutex::new(None),
            closing: AtomicBool::new(false),
        }
    }

    /// Initial pause after a failed stream receive.
    pub fn with_recv_backoff(mut self, backoff: Duration) -> Self {
        self.recv_backoff = backoff;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn identity(&self) -> Option<&AgentIdentity> {
        self.identity.get()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Register with the authority and start the rule sync session.
    ///
    /// Any failure here is returned to the caller; nothing is retried.
    #[instrument(skip(self, installer))]
    pub async fn register(
        &self,
        agent_name: &str,
        service_id: &str,
        kind: AgentKind,
        installer: Arc<dyn RuleInstaller>,
    ) -> Result<AgentIdentity> {
        if installer.kind() != kind {
            return Err(AgentError::KindMismatch {
                agent: kind,
                installer: installer.kind(),
            });
        }

        // Held until the session is stored, so a concurrent shutdown waits
        // for the registration outcome before it deregisters.
        let mut slot = self.session.lock().await;
        let current = self.state.get();
        if self.closing.load(Ordering::Acquire)
            || current != ConnectionState::Disconnected
            || self.identity.get().is_some()
        {
            return Err(AgentError::InvalidState {
                operation: "register",
                state: current,
            });
        }

        self.state.advance(ConnectionState::Registering);
        let response = match self.client.register(agent_name, service_id, kind).await {
            Ok(r) => r,
            Err(e) => {
                self.state.advance(ConnectionState::Disconnected);
                return Err(AgentError::Registration(e));
            }
        };
        let identity = AgentIdentity::new(response.agent_id, service_id, kind);

        if self.closing.load(Ordering::Acquire) {
            warn!(agent_id = %identity.agent_id, "shutdown began during registration, releasing identity");
            if let Err(e) = self.client.deregister(&identity).await {
                warn!(agent_id = %identity.agent_id, error = %e, "deregistration failed");
            }
            return Err(AgentError::InvalidState {
                operation: "register",
                state: self.state.get(),
            });
        }

        let identity = self.identity.get_or_init(|| identity).clone();
        info!(agent_id = %identity.agent_id, detail = %response.detail, "registered with authority");

        let parts = SessionParts {
            client: Arc::clone(&self.client),
            identity: identity.clone(),
            installer,
            health: self.health.clone(),
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
            stats: Arc::clone(&self.stats),
            recv_backoff: self.recv_backoff,
        };
        match RuleSyncSession::start(parts).await {
            Ok(session) => {
                *slot = Some(session);
                Ok(identity)
            }
            Err(e) => {
                self.state.advance(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Stop the sync session, deregister (best effort) and release the
    /// connection. Only the first call does anything.
    pub async fn shutdown(&self, reason: &str) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(reason, "agent shutting down");
        self.state.advance(ConnectionState::ShuttingDown);
        self.shutdown.trigger();

        if let Some(session) = self.session.lock().await.take() {
            if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, session.join()).await.is_err() {
                warn!("rule sync did not stop in time");
            }
        }

        // Deregistration runs even though cancellation is already raised.
        if let Some(identity) = self.identity.get() {
            match self.client.deregister(identity).await {
                Ok(resp) => info!(agent_id = %identity.agent_id, detail = %resp.detail, "deregistered"),
                Err(e) => warn!(agent_id = %identity.agent_id, error = %e, "deregistration failed"),
            }
        }

        self.client.close().await;
        self.state.advance(ConnectionState::Closed);
        info!("agent closed");
    }
}
