use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Where the agent is in its connection lifecycle.
///
/// `Disconnected → Registering → Streaming ⇄ Reconnecting → ShuttingDown → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Registering,
    Streaming,
    Reconnecting,
    ShuttingDown,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Registering => "registering",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::ShuttingDown => "shutting_down",
            ConnectionState::Closed => "closed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::ShuttingDown | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable connection state.
///
/// Once shutdown has begun the state only moves forward to `Closed`, so a
/// late transition from the sync task cannot resurrect a closing agent.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Move to `next`. Returns `false` when the transition was refused.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            let allowed = match (*current, next) {
                (from, to) if from == to => false,
                (ConnectionState::ShuttingDown, ConnectionState::Closed) => true,
                (from, _) => !from.is_terminal(),
            };
            if allowed {
                debug!(from = %current, to = %next, "connection state");
                *current = next;
            }
            allowed
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
