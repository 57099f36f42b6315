pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod shutdown;
pub mod supervise;

pub use config::AgentConfig;
pub use document::*;
pub use error::*;
pub use identity::*;
pub use shutdown::Shutdown;
pub use supervise::{catch_fault, spawn_supervised};
