use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use rasp_core::config::DetectConfig;
use rasp_core::supervise::TaskOutcome;
use rasp_core::{spawn_supervised, AgentKind, Shutdown};
use rasp_detect::{discover, ConfigScanner, DocumentReport, PortChecker};
use rasp_rules::{MisconfigRules, RuleInstaller, RuleStore};

use super::RaspAgent;
use crate::lifecycle::AgentLifecycle;

/// Result of one scheduled config scan.
#[derive(Debug, Clone)]
pub struct ScanRound {
    /// Rule store version the scan was started against.
    pub rules_version: u64,
    pub reports: Vec<DocumentReport>,
}

/// Misconfiguration agent: scans local config documents for weak values and
/// probes sensitive local ports.
pub struct MisconfigAgent {
    lifecycle: AgentLifecycle,
    store: Arc<RuleStore<MisconfigRules>>,
    scanner: ConfigScanner,
    ports: PortChecker,
    config: DetectConfig,
    rounds: Arc<watch::Sender<Option<ScanRound>>>,
}

impl MisconfigAgent {
    pub fn new(lifecycle: AgentLifecycle, config: DetectConfig) -> Self {
        let store = Arc::new(RuleStore::default());
        Self {
            scanner: ConfigScanner::new(Arc::clone(&store)),
            ports: PortChecker::new(Arc::clone(&store), config.port_probe_timeout),
            lifecycle,
            store,
            config,
            rounds: Arc::new(watch::channel(None).0),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore<MisconfigRules>> {
        &self.store
    }

    pub fn scanner(&self) -> &ConfigScanner {
        &self.scanner
    }

    pub fn port_checker(&self) -> &PortChecker {
        &self.ports
    }

    /// Latest scan made by the background engines.
    pub fn scan_rounds(&self) -> watch::Receiver<Option<ScanRound>> {
        self.rounds.subscribe()
    }

    /// Discover and scan every document under the configured directory.
    pub async fn scan_configs(&self) -> Vec<DocumentReport> {
        scan_dir(
            self.scanner.clone(),
            self.config.config_dir.clone(),
            self.lifecycle.shutdown_signal().clone(),
        )
        .await
    }
}

async fn scan_dir(scanner: ConfigScanner, dir: PathBuf, shutdown: Shutdown) -> Vec<DocumentReport> {
    let discovered = tokio::task::spawn_blocking({
        let dir = dir.clone();
        move || discover(&dir)
    })
    .await;

    let discovery = match discovered {
        Ok(Ok(d)) => d,
        Ok(Err(e)) => {
            warn!(error = %e, "config discovery failed");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "config discovery task failed");
            return Vec::new();
        }
    };

    let reports = scanner.scan_documents(discovery.documents, &shutdown).await;
    let findings: usize = reports.iter().map(|r| r.findings.len()).sum();
    info!(dir = %dir.display(), documents = reports.len(), findings, "config scan complete");
    reports
}

/// Scan once at start, then again whenever a new rule version has been
/// installed. The store version is checked every `period`.
async fn rescan_on_rule_change(
    scanner: ConfigScanner,
    store: Arc<RuleStore<MisconfigRules>>,
    dir: PathBuf,
    shutdown: Shutdown,
    period: Duration,
    rounds: Arc<watch::Sender<Option<ScanRound>>>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut scanned: Option<u64> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let version = store.version();
        if scanned == Some(version) {
            continue;
        }
        let reports = scan_dir(scanner.clone(), dir.clone(), shutdown.clone()).await;
        scanned = Some(version);
        rounds.send_replace(Some(ScanRound {
            rules_version: version,
            reports,
        }));
    }
}

#[async_trait]
impl RaspAgent for MisconfigAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SecMis
    }

    fn lifecycle(&self) -> &AgentLifecycle {
        &self.lifecycle
    }

    fn installer(&self) -> Arc<dyn RuleInstaller> {
        self.store.clone()
    }

    fn spawn_engines(&self) -> Vec<JoinHandle<TaskOutcome>> {
        let shutdown = self.lifecycle.shutdown_signal().clone();

        let ports = spawn_supervised(
            "port-checker",
            self.ports.clone().run(shutdown.clone(), self.config.port_scan_interval),
        );

        let scan = spawn_supervised(
            "config-scan",
            rescan_on_rule_change(
                self.scanner.clone(),
                Arc::clone(&self.store),
                self.config.config_dir.clone(),
                shutdown,
                self.config.port_scan_interval,
                Arc::clone(&self.rounds),
            ),
        );

        vec![ports, scan]
    }
}
