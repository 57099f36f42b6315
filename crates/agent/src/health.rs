//! Authority liveness polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use rasp_core::config::HealthConfig;
use rasp_core::Shutdown;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// Reachable but answered with something other than 200.
    Unhealthy,
    Unreachable,
}

/// One liveness check against the authority.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Liveness;
}

/// Plain HTTP GET against the authority's health endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        Self::new(config.url(), config.request_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Liveness {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => Liveness::Healthy,
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "authority unhealthy");
                Liveness::Unhealthy
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "authority unreachable");
                Liveness::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    Cancelled,
}

/// Polls a [`HealthProbe`] at a fixed interval until it reports healthy.
#[derive(Clone)]
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, poll_interval: Duration) -> Self {
        Self { probe, poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Block until the authority is healthy or `shutdown` fires. The signal is
    /// checked before every probe, and both the probe and the sleep between
    /// probes are raced against it.
    pub async fn wait_until_healthy(&self, shutdown: &Shutdown) -> HealthOutcome {
        let mut attempts: u64 = 0;
        loop {
            if shutdown.is_triggered() {
                return HealthOutcome::Cancelled;
            }

            attempts += 1;
            let liveness = tokio::select! {
                _ = shutdown.cancelled() => return HealthOutcome::Cancelled,
                liveness = self.probe.probe() => liveness,
            };
            if liveness == Liveness::Healthy {
                info!(attempts, "authority is healthy");
                return HealthOutcome::Healthy;
            }
            debug!(attempts, ?liveness, interval = ?self.poll_interval, "authority not ready, polling again");

            if shutdown.sleep(self.poll_interval).await {
                return HealthOutcome::Cancelled;
            }
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
