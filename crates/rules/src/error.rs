//! Error types for rule installation and seed loading.

use rasp_core::AgentKind;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A snapshot for one agent kind was offered to another kind's store.
    #[error("rule kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: AgentKind, got: AgentKind },

    /// Rule content that cannot be evaluated.
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;
