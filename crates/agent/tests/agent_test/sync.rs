use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rasp_agent::{AgentLifecycle, ConnectionState, HealthMonitor, RaspAgent, SsrfAgent};
use rasp_core::{AgentKind, Shutdown};
use rasp_rules::{RuleInstaller, RuleSnapshot, RuleStore, SsrfRules};
use rasp_wire::{StreamEvent, WireError};

use crate::mocks::{eventually, ssrf_hosts, MockAuthority, ToggleProbe};

const POLL: Duration = Duration::from_millis(10);

fn ssrf_agent(authority: &Arc<MockAuthority>, probe: &Arc<ToggleProbe>) -> SsrfAgent {
    let health = HealthMonitor::new(probe.clone(), POLL);
    let lifecycle =
        AgentLifecycle::new(authority.clone(), health, Shutdown::new()).with_recv_backoff(Duration::from_millis(10));
    SsrfAgent::new(lifecycle)
}

#[tokio::test]
async fn clean_end_reconnects_once_after_health_recovers() {
    let authority = MockAuthority::new();
    let first = authority.push_stream();
    let second = authority.push_stream();
    let probe = ToggleProbe::new(false);
    let agent = ssrf_agent(&authority, &probe);
    let stats = || agent.lifecycle().stats();

    agent.start("edge", "payments").await.unwrap();
    assert_eq!(agent.lifecycle().state(), ConnectionState::Streaming);

    first.send(StreamEvent::Rules(ssrf_hosts(&["evil.one"]))).unwrap();
    eventually("first install", || stats().installed() == 1).await;
    assert!(agent.egress().check_host("evil.one"));

    // Authority closes the stream: the session must wait for health.
    drop(first);
    eventually("reconnecting", || agent.lifecycle().state() == ConnectionState::Reconnecting).await;
    eventually("a few unhealthy probes", || probe.calls.load(Ordering::SeqCst) >= 3).await;
    assert_eq!(stats().reconnects(), 0);
    assert_eq!(authority.subscribes(), 1);

    probe.set_healthy(true);
    eventually("streaming again", || agent.lifecycle().state() == ConnectionState::Streaming).await;
    assert_eq!(stats().reconnects(), 1);
    assert_eq!(authority.subscribes(), 2);

    second.send(StreamEvent::Rules(ssrf_hosts(&["evil.two"]))).unwrap();
    eventually("second install", || stats().installed() == 2).await;
    assert!(agent.egress().check_host("evil.two"));
    assert!(!agent.egress().check_host("evil.one"));
    assert_eq!(stats().reconnects(), 1);

    agent.shutdown("test done").await;
    assert_eq!(agent.lifecycle().state(), ConnectionState::Closed);
    drop(second);
}

#[tokio::test]
async fn receive_error_stays_on_the_same_stream() {
    let authority = MockAuthority::new();
    let feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = ssrf_agent(&authority, &probe);

    agent.start("edge", "payments").await.unwrap();
    feed.send(StreamEvent::Error(WireError::Transport("blip".into()))).unwrap();
    feed.send(StreamEvent::Error(WireError::Transport("blip".into()))).unwrap();
    feed.send(StreamEvent::Rules(ssrf_hosts(&["evil.example"]))).unwrap();

    eventually("install after errors", || agent.lifecycle().stats().installed() == 1).await;
    assert_eq!(authority.subscribes(), 1);
    assert_eq!(agent.lifecycle().stats().reconnects(), 0);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

    agent.shutdown("test done").await;
}

#[tokio::test]
async fn failed_resubscribe_goes_back_to_health_polling() {
    let authority = MockAuthority::new();
    let first = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = ssrf_agent(&authority, &probe);

    agent.start("edge", "payments").await.unwrap();
    drop(first);

    // No second stream is queued, so every re-subscribe fails.
    eventually("several attempts", || agent.lifecycle().stats().reconnects() >= 3).await;
    assert_eq!(agent.lifecycle().state(), ConnectionState::Reconnecting);

    let late = authority.push_stream();
    eventually("streaming again", || agent.lifecycle().state() == ConnectionState::Streaming).await;
    late.send(StreamEvent::Rules(ssrf_hosts(&["late.example"]))).unwrap();
    eventually("install on late stream", || agent.egress().check_host("late.example")).await;

    agent.shutdown("test done").await;
}

/// Panics on its first install, then delegates to a real store.
struct FragileInstaller {
    store: RuleStore<SsrfRules>,
    calls: AtomicUsize,
}

impl RuleInstaller for FragileInstaller {
    fn kind(&self) -> AgentKind {
        AgentKind::Ssrf
    }

    fn install(&self, snapshot: RuleSnapshot) -> rasp_rules::Result<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("installer blew up");
        }
        self.store.install(snapshot)
    }
}

#[tokio::test]
async fn installer_panic_does_not_stop_the_session() {
    let authority = MockAuthority::new();
    let feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let lifecycle = AgentLifecycle::new(authority.clone(), HealthMonitor::new(probe, POLL), Shutdown::new());
    let installer = Arc::new(FragileInstaller {
        store: RuleStore::default(),
        calls: AtomicUsize::new(0),
    });

    lifecycle
        .register("edge", "payments", AgentKind::Ssrf, installer.clone())
        .await
        .unwrap();

    feed.send(StreamEvent::Rules(ssrf_hosts(&["first.example"]))).unwrap();
    feed.send(StreamEvent::Rules(ssrf_hosts(&["second.example"]))).unwrap();

    eventually("second install", || lifecycle.stats().installed() == 1).await;
    assert!(installer.store.get().contains_host("second.example"));
    assert_eq!(lifecycle.state(), ConnectionState::Streaming);

    lifecycle.shutdown("test done").await;
}

#[tokio::test]
async fn mismatched_rules_leave_store_untouched() {
    let authority = MockAuthority::new();
    let feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = ssrf_agent(&authority, &probe);

    agent.start("edge", "payments").await.unwrap();
    feed.send(StreamEvent::Rules(rasp_wire::protocol::NewRules::SecMis {
        ports: vec![22],
        string_params: Default::default(),
        float_params: Default::default(),
        bool_params: Default::default(),
        int_params: Default::default(),
    }))
    .unwrap();
    feed.send(StreamEvent::Rules(ssrf_hosts(&["evil.example"]))).unwrap();

    eventually("ssrf install", || agent.lifecycle().stats().installed() == 1).await;
    assert_eq!(agent.store().version(), 1);

    agent.shutdown("test done").await;
}
