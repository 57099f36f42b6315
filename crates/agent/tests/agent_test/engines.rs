//! Background engines of the misconfiguration agent.

use std::collections::HashMap;
use std::time::Duration;

use rasp_agent::{AgentLifecycle, HealthMonitor, MisconfigAgent, RaspAgent, ScanRound};
use rasp_core::config::DetectConfig;
use rasp_core::supervise::TaskOutcome;
use rasp_core::Shutdown;
use rasp_rules::MisconfigRules;
use tokio::sync::watch;

use crate::mocks::{MockAuthority, ToggleProbe};

async fn next_round(rounds: &mut watch::Receiver<Option<ScanRound>>, version: u64) -> ScanRound {
    let round = tokio::time::timeout(
        Duration::from_secs(2),
        rounds.wait_for(|r| r.as_ref().is_some_and(|round| round.rules_version == version)),
    )
    .await
    .expect("scan round should arrive")
    .unwrap();
    round.clone().unwrap()
}

fn findings(round: &ScanRound) -> usize {
    round.reports.iter().map(|r| r.findings.len()).sum()
}

#[tokio::test]
async fn config_is_rescanned_when_rules_change() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.json"),
        r#"{"debug": true, "tls": {"ciphers": "RC4"}}"#,
    )
    .unwrap();

    let authority = MockAuthority::new();
    let probe = ToggleProbe::new(true);
    let lifecycle = AgentLifecycle::new(
        authority.clone(),
        HealthMonitor::new(probe.clone(), Duration::from_millis(10)),
        Shutdown::new(),
    );
    let config = DetectConfig {
        port_scan_interval: Duration::from_millis(20),
        port_probe_timeout: Duration::from_millis(50),
        config_dir: dir.path().to_path_buf(),
    };
    let agent = MisconfigAgent::new(lifecycle, config);
    agent.store().replace(MisconfigRules {
        bool_params: HashMap::from([("debug".to_string(), true)]),
        ..Default::default()
    });

    let mut rounds = agent.scan_rounds();
    let handles = agent.spawn_engines();

    let first = next_round(&mut rounds, 1).await;
    assert_eq!(first.reports.len(), 1);
    assert_eq!(findings(&first), 1);

    agent.store().replace(MisconfigRules {
        bool_params: HashMap::from([("debug".to_string(), true)]),
        string_params: HashMap::from([("ciphers".to_string(), "RC4".to_string())]),
        ..Default::default()
    });
    let second = next_round(&mut rounds, 2).await;
    assert_eq!(findings(&second), 2);

    agent.lifecycle().shutdown_signal().trigger();
    for handle in handles {
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine should stop after shutdown")
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
    }
}
