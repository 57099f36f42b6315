use std::fmt;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Which engine produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Egress,
    ConfigScan,
    PortExposure,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Egress => "egress",
            Engine::ConfigScan => "config_scan",
            Engine::PortExposure => "port_exposure",
        };
        f.write_str(name)
    }
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub engine: Engine,
    pub severity: Severity,
    /// What was flagged: a config key, a port, an outbound target.
    pub subject: String,
    pub detail: String,
}

impl Finding {
    pub fn new(engine: Engine, severity: Severity, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            engine,
            severity,
            subject: subject.into(),
            detail: detail.into(),
        }
    }

    /// Emit the finding to the log.
    pub fn report(&self) {
        warn!(
            engine = %self.engine,
            severity = ?self.severity,
            subject = %self.subject,
            "{}",
            self.detail
        );
    }
}
