//! rasp-agent: runtime security agent process.
//!
//! Registers with the authority, keeps rules in sync and runs the detection
//! engines for the configured agent kind until SIGINT / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use rasp_agent::{AgentLifecycle, HealthMonitor, HttpHealthProbe, MisconfigAgent, RaspAgent, SsrfAgent};
use rasp_core::config::load_dotenv;
use rasp_core::{AgentConfig, AgentKind, Shutdown};
use rasp_wire::{AuthorityClient, Transport, ZmqAuthorityClient};

/// How long engines get to observe cancellation before the process exits.
const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ── CLI ─────────────────────────────────────────────────────────────

/// Runtime security agent. Flags override the RASP_* environment.
#[derive(Parser, Debug)]
#[command(name = "rasp-agent", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, env = "RASP_PROFILE")]
    profile: Option<String>,

    /// Agent kind: ssrf_agent or sec_mis_agent.
    #[arg(long)]
    kind: Option<AgentKind>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    service_id: Option<String>,

    #[arg(long)]
    authority_host: Option<String>,

    #[arg(long)]
    authority_port: Option<u16>,

    /// host:port of the authority health endpoint.
    #[arg(long)]
    health_addr: Option<String>,

    /// Directory scanned for JSON / YAML configuration documents.
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// YAML rule snapshot installed before the first sync.
    #[arg(long)]
    seed_rules: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut AgentConfig) {
        if let Some(kind) = self.kind {
            config.agent.kind = kind;
        }
        if let Some(name) = self.name {
            config.agent.name = name;
        }
        if let Some(service_id) = self.service_id {
            config.agent.service_id = service_id;
        }
        if let Some(host) = self.authority_host {
            config.authority.host = host;
        }
        if let Some(port) = self.authority_port {
            config.authority.port = port;
        }
        if let Some(addr) = self.health_addr {
            config.health.addr = addr;
        }
        if let Some(dir) = self.config_dir {
            config.detect.config_dir = dir;
        }
        if let Some(seed) = self.seed_rules {
            config.rules.seed_file = Some(seed);
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match cli.profile.as_deref() {
        Some(profile) => AgentConfig::for_profile(profile),
        None => AgentConfig::from_env(),
    };
    cli.apply(&mut config);
    config.validate()?;
    config.log_summary();

    let transport = Transport::tcp(config.authority.host.clone(), config.authority.port);
    let client: Arc<dyn AuthorityClient> = Arc::new(
        ZmqAuthorityClient::connect(&transport, config.authority.request_timeout)
            .await
            .with_context(|| format!("connecting to authority at {transport}"))?,
    );

    let probe = HttpHealthProbe::from_config(&config.health)?;
    let health = HealthMonitor::new(Arc::new(probe), config.health.poll_interval);
    let shutdown = Shutdown::new();
    let lifecycle = AgentLifecycle::new(client, health, shutdown.clone())
        .with_recv_backoff(config.authority.recv_backoff);

    let agent: Box<dyn RaspAgent> = match config.agent.kind {
        AgentKind::Ssrf => Box::new(SsrfAgent::new(lifecycle)),
        AgentKind::SecMis => Box::new(MisconfigAgent::new(lifecycle, config.detect.clone())),
    };

    if let Some(seed) = &config.rules.seed_file {
        let version = agent
            .seed(seed)
            .with_context(|| format!("loading seed rules from {}", seed.display()))?;
        info!(path = %seed.display(), version, "seed rules installed");
    }

    let identity = match agent.start(&config.agent.name, &config.agent.service_id).await {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "agent failed to start");
            agent.shutdown("startup failed").await;
            return Err(e.into());
        }
    };
    info!(agent_id = %identity.agent_id, kind = %identity.kind, "agent running");

    let engines = agent.spawn_engines();

    let reason = match wait_for_signal().await {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "signal handler unavailable, shutting down");
            "signal handler error"
        }
    };
    shutdown.trigger();
    agent.shutdown(reason).await;

    for engine in engines {
        match tokio::time::timeout(ENGINE_STOP_TIMEOUT, engine).await {
            Ok(Ok(outcome)) => info!(?outcome, "engine stopped"),
            Ok(Err(e)) => warn!(error = %e, "engine join failed"),
            Err(_) => warn!("engine did not stop in time"),
        }
    }

    info!("rasp-agent exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
