//! In-process stand-ins for the authority and its health endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rasp_agent::{HealthProbe, Liveness};
use rasp_core::{AgentIdentity, AgentKind};
use rasp_wire::protocol::{DetailResponse, NewRules, RegAgentResponse};
use rasp_wire::{AuthorityClient, RuleStream, StreamEvent, WireError};

pub type StreamFeed = mpsc::UnboundedSender<StreamEvent>;

/// Scripted authority. Every `subscribe_rules` call consumes the next stream
/// queued with [`push_stream`](MockAuthority::push_stream); dropping the feed
/// ends that stream cleanly.
#[derive(Default)]
pub struct MockAuthority {
    reject_registration: Option<String>,
    register_delay: Option<Duration>,
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<StreamEvent>>>,
    pub register_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub deregister_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl MockAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reject_registration: Some(reason.to_string()),
            ..Default::default()
        })
    }

    /// Answers registration only after `delay`.
    pub fn slow_to_register(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            register_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn push_stream(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    pub fn subscribes(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn deregisters(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorityClient for MockAuthority {
    async fn register(
        &self,
        agent_name: &str,
        _service_id: &str,
        _kind: AgentKind,
    ) -> Result<RegAgentResponse, WireError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.register_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reject_registration {
            Some(reason) => Err(WireError::Rejected(reason.clone())),
            None => Ok(RegAgentResponse {
                agent_id: format!("{agent_name}-id"),
                detail: "registered".into(),
            }),
        }
    }

    async fn deregister(&self, _identity: &AgentIdentity) -> Result<DetailResponse, WireError> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DetailResponse {
            detail: "closed".into(),
        })
    }

    async fn subscribe_rules(&self, _identity: &AgentIdentity) -> Result<Box<dyn RuleStream>, WireError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().unwrap().pop_front() {
            Some(rx) => Ok(Box::new(ScriptedStream { rx })),
            None => Err(WireError::Transport("no stream available".into())),
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

#[async_trait]
impl RuleStream for ScriptedStream {
    async fn next_event(&mut self) -> StreamEvent {
        self.rx.recv().await.unwrap_or(StreamEvent::Ended)
    }
}

/// Health probe whose answer the test flips.
#[derive(Default)]
pub struct ToggleProbe {
    healthy: AtomicBool,
    pub calls: AtomicUsize,
}

impl ToggleProbe {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for ToggleProbe {
    async fn probe(&self) -> Liveness {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Liveness::Healthy
        } else {
            Liveness::Unreachable
        }
    }
}

pub fn ssrf_hosts(hosts: &[&str]) -> NewRules {
    NewRules::Ssrf {
        ip_rules: vec![],
        host_rules: hosts.iter().map(|h| h.to_string()).collect(),
        regexp_rules: vec![],
        scheme_rules: vec![],
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
