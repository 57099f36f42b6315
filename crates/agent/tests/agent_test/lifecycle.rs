use std::sync::atomic::Ordering;
use std::time::Duration;

use rasp_agent::{
    AgentError, AgentLifecycle, ConnectionState, HealthMonitor, MisconfigAgent, RaspAgent, SsrfAgent,
};
use rasp_core::config::DetectConfig;
use rasp_core::{AgentKind, Shutdown};
use rasp_rules::RuleStore;
use rasp_wire::WireError;

use crate::mocks::{MockAuthority, ToggleProbe};

fn lifecycle(authority: &std::sync::Arc<MockAuthority>, probe: &std::sync::Arc<ToggleProbe>) -> AgentLifecycle {
    AgentLifecycle::new(
        authority.clone(),
        HealthMonitor::new(probe.clone(), Duration::from_millis(10)),
        Shutdown::new(),
    )
}

#[tokio::test]
async fn registration_failure_is_surfaced() {
    let authority = MockAuthority::rejecting("unknown service");
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));

    let err = agent.start("edge", "nope").await.unwrap_err();
    assert!(matches!(err, AgentError::Registration(WireError::Rejected(ref r)) if r == "unknown service"));
    assert_eq!(agent.lifecycle().state(), ConnectionState::Disconnected);
    assert!(agent.lifecycle().identity().is_none());
    assert_eq!(authority.subscribes(), 0);

    // Nothing was registered, so nothing is deregistered.
    agent.shutdown("startup failed").await;
    assert_eq!(authority.deregisters(), 0);
    assert_eq!(authority.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identity_is_assigned_by_authority() {
    let authority = MockAuthority::new();
    let _feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));

    let identity = agent.start("edge", "payments").await.unwrap();
    assert_eq!(identity.agent_id, "edge-id");
    assert_eq!(identity.service_id, "payments");
    assert_eq!(identity.kind, AgentKind::Ssrf);
    assert_eq!(agent.lifecycle().identity(), Some(&identity));

    agent.shutdown("test done").await;
}

#[tokio::test]
async fn double_shutdown_deregisters_once() {
    let authority = MockAuthority::new();
    let _feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));
    agent.start("edge", "payments").await.unwrap();

    tokio::join!(agent.shutdown("first"), agent.shutdown("second"));
    agent.shutdown("third").await;

    assert_eq!(authority.deregisters(), 1);
    assert_eq!(authority.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(agent.lifecycle().state(), ConnectionState::Closed);
    assert!(agent.lifecycle().shutdown_signal().is_triggered());
}

#[tokio::test]
async fn shutdown_while_reconnecting_still_deregisters() {
    let authority = MockAuthority::new();
    let feed = authority.push_stream();
    let probe = ToggleProbe::new(false);
    let lifecycle = AgentLifecycle::new(
        authority.clone(),
        HealthMonitor::new(probe.clone(), Duration::from_secs(60)),
        Shutdown::new(),
    );
    let agent = SsrfAgent::new(lifecycle);
    agent.start("edge", "payments").await.unwrap();

    drop(feed);
    crate::mocks::eventually("reconnecting", || {
        agent.lifecycle().state() == ConnectionState::Reconnecting
    })
    .await;

    tokio::time::timeout(Duration::from_secs(2), agent.shutdown("signal"))
        .await
        .expect("shutdown must not wait out the health poll");
    assert_eq!(authority.deregisters(), 1);
    assert_eq!(agent.lifecycle().state(), ConnectionState::Closed);
}

#[tokio::test]
async fn shutdown_during_registration_releases_identity() {
    let authority = MockAuthority::slow_to_register(Duration::from_millis(100));
    let _feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));
    let mut states = agent.lifecycle().state_cell().subscribe();

    let (registered, ()) = tokio::join!(agent.start("edge", "payments"), async {
        states
            .wait_for(|s| *s == ConnectionState::Registering)
            .await
            .unwrap();
        agent.shutdown("signal").await;
    });

    let err = registered.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState { operation: "register", .. }));
    assert_eq!(authority.register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(authority.deregisters(), 1);
    assert_eq!(authority.subscribes(), 0);
    assert!(agent.lifecycle().identity().is_none());
    assert_eq!(agent.lifecycle().state(), ConnectionState::Closed);
}

#[tokio::test]
async fn register_twice_is_rejected() {
    let authority = MockAuthority::new();
    let _feed = authority.push_stream();
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));
    agent.start("edge", "payments").await.unwrap();

    let err = agent.start("edge", "payments").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState { operation: "register", .. }));
    assert_eq!(authority.register_calls.load(Ordering::SeqCst), 1);

    agent.shutdown("test done").await;
}

#[tokio::test]
async fn installer_kind_must_match_registration() {
    let authority = MockAuthority::new();
    let probe = ToggleProbe::new(true);
    let lifecycle = lifecycle(&authority, &probe);
    let store = std::sync::Arc::new(RuleStore::<rasp_rules::MisconfigRules>::default());

    let err = lifecycle
        .register("edge", "payments", AgentKind::Ssrf, store)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::KindMismatch { .. }));
    assert_eq!(authority.register_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn seed_file_populates_misconfig_store() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.yaml");
    std::fs::write(
        &seed,
        "kind: sec_mis_agent\nports: [6379]\nbool_params:\n  debug: true\n",
    )
    .unwrap();

    let authority = MockAuthority::new();
    let probe = ToggleProbe::new(true);
    let config = DetectConfig {
        port_scan_interval: Duration::from_secs(60),
        port_probe_timeout: Duration::from_millis(100),
        config_dir: dir.path().to_path_buf(),
    };
    let agent = MisconfigAgent::new(lifecycle(&authority, &probe), config);

    assert_eq!(agent.seed(&seed).unwrap(), 1);
    assert_eq!(agent.store().get().ports, vec![6379]);

    std::fs::write(dir.path().join("app.json"), r#"{"debug": true}"#).unwrap();
    let reports = agent.scan_configs().await;
    let findings: usize = reports.iter().map(|r| r.findings.len()).sum();
    assert_eq!(findings, 1);
}

#[tokio::test]
async fn seed_for_other_kind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.yaml");
    std::fs::write(&seed, "kind: sec_mis_agent\nports: [22]\n").unwrap();

    let authority = MockAuthority::new();
    let probe = ToggleProbe::new(true);
    let agent = SsrfAgent::new(lifecycle(&authority, &probe));

    let err = agent.seed(&seed).unwrap_err();
    assert!(matches!(err, AgentError::Rules(_)));
    assert_eq!(agent.store().version(), 0);
}
