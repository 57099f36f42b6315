//! Network exposure checker: probes sensitive local ports on a timer.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use rasp_core::Shutdown;
use rasp_rules::{MisconfigRules, RuleStore};

use crate::finding::{Engine, Finding, Severity};

/// Outcome of a single connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
    /// Neither clearly open nor refused (timeout, permission, ...).
    Indeterminate(String),
}

#[derive(Debug, Clone)]
pub struct PortChecker {
    store: Arc<RuleStore<MisconfigRules>>,
    host: IpAddr,
    probe_timeout: Duration,
}

impl PortChecker {
    pub fn new(store: Arc<RuleStore<MisconfigRules>>, probe_timeout: Duration) -> Self {
        Self {
            store,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            probe_timeout,
        }
    }

    /// Attempt one TCP connect to `port` on the probe host.
    pub async fn probe(&self, port: u16) -> PortState {
        let addr = SocketAddr::new(self.host, port);
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => PortState::Open,
            Ok(Err(e)) => classify(&e),
            Err(_) => PortState::Indeterminate(format!("no answer within {:?}", self.probe_timeout)),
        }
    }

    /// Probe every port in the current snapshot concurrently and return a
    /// warning finding for each open one. A failing probe does not affect
    /// the others; cancellation aborts the probes still in flight.
    pub async fn check_all(&self, shutdown: &Shutdown) -> Vec<Finding> {
        let rules = self.store.get();
        let mut probes = JoinSet::new();
        for &port in &rules.ports {
            let checker = self.clone();
            probes.spawn(async move { (port, checker.probe(port).await) });
        }

        let mut findings = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    probes.abort_all();
                    break;
                }
                joined = probes.join_next() => match joined {
                    Some(Ok((port, PortState::Open))) => {
                        let finding = Finding::new(
                            Engine::PortExposure,
                            Severity::Warning,
                            port.to_string(),
                            format!("port {port} is open on {}", self.host),
                        );
                        finding.report();
                        findings.push(finding);
                    }
                    Some(Ok((port, PortState::Closed))) => debug!(port, "port closed"),
                    Some(Ok((port, PortState::Indeterminate(reason)))) => {
                        warn!(port, reason = %reason, "port state indeterminate");
                    }
                    Some(Err(e)) => warn!(error = %e, "port probe task failed"),
                    None => break,
                },
            }
        }
        findings
    }

    /// Re-check the port list every `period` until cancelled. The first
    /// check happens one period after start.
    pub async fn run(self, shutdown: Shutdown, period: Duration) {
        info!(host = %self.host, ?period, "port checker started");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let open = self.check_all(&shutdown).await;
                    debug!(open = open.len(), "port check pass complete");
                }
            }
        }
        info!("port checker stopped");
    }
}

fn classify(e: &io::Error) -> PortState {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::AddrNotAvailable => PortState::Closed,
        _ => PortState::Indeterminate(e.to_string()),
    }
}
