use rasp_core::{AgentKind, CoreError};
use rasp_rules::RuleError;
use rasp_wire::WireError;

use crate::state::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The authority rejected registration or could not be reached. Fatal at
    /// startup.
    #[error("registration failed: {0}")]
    Registration(#[source] WireError),

    #[error("rule subscription failed: {0}")]
    Subscription(#[source] WireError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("installer handles {installer} rules, agent registers as {agent}")]
    KindMismatch { agent: AgentKind, installer: AgentKind },

    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error("health probe setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
