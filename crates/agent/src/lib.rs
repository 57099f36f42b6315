//! Runtime security agent.
//!
//! Registers with the authority, keeps a rule subscription alive across
//! authority restarts, and runs the detection engines for its kind.

pub mod error;
pub mod health;
pub mod kinds;
pub mod lifecycle;
pub mod state;
pub mod sync;

pub use error::{AgentError, Result};
pub use health::{HealthMonitor, HealthOutcome, HealthProbe, HttpHealthProbe, Liveness};
pub use kinds::{MisconfigAgent, RaspAgent, ScanRound, SsrfAgent};
pub use lifecycle::AgentLifecycle;
pub use state::{ConnectionState, StateCell};
pub use sync::{snapshot_from_wire, RuleSyncSession, SyncStats};
