//! Rule state for the agent.
//!
//! This crate provides:
//! - Typed rule tables per agent kind (SSRF blacklists, misconfiguration tables)
//! - `RuleSnapshot`, the wholesale unit of rule replacement
//! - `RuleStore`, an atomic-swap holder readers borrow immutable snapshots from
//! - `RuleInstaller`, the capability the sync session hands new rules to
//! - YAML seed files for running before the first sync

pub mod error;
pub mod installer;
pub mod misconfig;
pub mod seed;
pub mod snapshot;
pub mod ssrf;
pub mod store;

pub use error::{Result, RuleError};
pub use installer::RuleInstaller;
pub use misconfig::MisconfigRules;
pub use seed::{load_seed_file, parse_seed};
pub use snapshot::RuleSnapshot;
pub use ssrf::{CompiledPattern, SsrfRules};
pub use store::RuleStore;
