use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::identity::AgentKind;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_millis(profile: &str, key: &str, default: u64) -> Duration {
    let ms = profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

// ── Top-level config ──────────────────────────────────────────

/// Everything the agent core needs: where the authority lives, which agent
/// kind to run, and the timing of its background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub authority: AuthorityConfig,
    pub agent: AgentSection,
    pub health: HealthConfig,
    pub detect: DetectConfig,
    pub rules: RulesConfig,
}

impl AgentConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RASP_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RASP_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            authority: AuthorityConfig::from_env_profiled(p),
            agent: AgentSection::from_env_profiled(p),
            health: HealthConfig::from_env_profiled(p),
            detect: DetectConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.service_id.trim().is_empty() {
            return Err(CoreError::Config("RASP_SERVICE_ID must be set".into()));
        }
        if self.authority.port == 0 {
            return Err(CoreError::Config("authority port must be non-zero".into()));
        }
        let intervals = [
            ("health poll interval", self.health.poll_interval),
            ("port scan interval", self.detect.port_scan_interval),
            ("port probe timeout", self.detect.port_probe_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(CoreError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  authority:   {}", self.authority.address());
        tracing::info!(
            "  agent:       kind={}, name={}, service={}",
            self.agent.kind,
            self.agent.name,
            self.agent.service_id
        );
        tracing::info!(
            "  health:      url={}, poll={:?}",
            self.health.url(),
            self.health.poll_interval
        );
        tracing::info!(
            "  detect:      port_scan={:?}, config_dir={}",
            self.detect.port_scan_interval,
            self.detect.config_dir.display()
        );
        tracing::info!(
            "  rules:       seed={}",
            self.rules
                .seed_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".into())
        );
    }
}

// ── Authority ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for unary calls (register / deregister).
    pub request_timeout: Duration,
    /// Initial pause after a failed stream receive.
    pub recv_backoff: Duration,
}

impl AuthorityConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "RASP_AUTHORITY_HOST", "localhost"),
            port: profiled_env_u16(p, "RASP_AUTHORITY_PORT", 50051),
            request_timeout: profiled_env_millis(p, "RASP_REQUEST_TIMEOUT_MS", 10_000),
            recv_backoff: profiled_env_millis(p, "RASP_RECV_BACKOFF_MS", 100),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Agent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub kind: AgentKind,
    pub name: String,
    pub service_id: String,
}

impl AgentSection {
    fn from_env_profiled(p: &str) -> Self {
        let kind = profiled_env_or(p, "RASP_AGENT_TYPE", "ssrf_agent");
        let kind = kind.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to ssrf_agent");
            AgentKind::Ssrf
        });
        Self {
            kind,
            name: profiled_env_or(p, "RASP_AGENT_NAME", "rasp-agent"),
            service_id: profiled_env_or(p, "RASP_SERVICE_ID", ""),
        }
    }
}

// ── Health ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// `host:port` of the authority's HTTP health endpoint.
    pub addr: String,
    pub path: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl HealthConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            addr: profiled_env_or(p, "RASP_HEALTH_ADDR", "localhost:8000"),
            path: profiled_env_or(p, "RASP_HEALTH_PATH", "/general/health"),
            poll_interval: profiled_env_millis(p, "RASP_HEALTH_INTERVAL_MS", 5_000),
            request_timeout: profiled_env_millis(p, "RASP_HEALTH_TIMEOUT_MS", 2_000),
        }
    }

    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}{}", self.addr, path)
    }
}

// ── Detection ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    pub port_scan_interval: Duration,
    pub port_probe_timeout: Duration,
    /// Directory searched for JSON / YAML configuration documents.
    pub config_dir: PathBuf,
}

impl DetectConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            port_scan_interval: profiled_env_millis(p, "RASP_PORT_SCAN_INTERVAL_MS", 30_000),
            port_probe_timeout: profiled_env_millis(p, "RASP_PORT_PROBE_TIMEOUT_MS", 500),
            config_dir: PathBuf::from(profiled_env_or(p, "RASP_CONFIG_DIR", ".")),
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Optional YAML snapshot installed before the first sync message.
    pub seed_file: Option<PathBuf>,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            seed_file: profiled_env_opt(p, "RASP_SEED_RULES").map(PathBuf::from),
        }
    }
}
