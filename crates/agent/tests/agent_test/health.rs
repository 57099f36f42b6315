use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use rasp_agent::{HealthMonitor, HealthOutcome, HealthProbe, HttpHealthProbe, Liveness};
use rasp_core::Shutdown;

use crate::mocks::ToggleProbe;

/// Serve a single fixed HTTP status on an ephemeral port, forever.
async fn http_responder(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn http_200_is_healthy() {
    let addr = http_responder("200 OK").await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/general/health"), Duration::from_secs(2)).unwrap();
    assert_eq!(probe.probe().await, Liveness::Healthy);
}

#[tokio::test]
async fn other_statuses_are_unhealthy() {
    let addr = http_responder("503 Service Unavailable").await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/general/health"), Duration::from_secs(2)).unwrap();
    assert_eq!(probe.probe().await, Liveness::Unhealthy);

    let addr = http_responder("204 No Content").await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/general/health"), Duration::from_secs(2)).unwrap();
    assert_eq!(probe.probe().await, Liveness::Unhealthy);
}

#[tokio::test]
async fn nothing_listening_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = HttpHealthProbe::new(format!("http://{addr}/general/health"), Duration::from_secs(1)).unwrap();
    assert_eq!(probe.probe().await, Liveness::Unreachable);
}

#[tokio::test]
async fn cancellation_mid_sleep_returns_promptly() {
    let probe = ToggleProbe::new(false);
    let monitor = HealthMonitor::new(probe.clone(), Duration::from_secs(60));
    let shutdown = Shutdown::new();

    let waiter = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { monitor.wait_until_healthy(&shutdown).await })
    };
    crate::mocks::eventually("first probe", || probe.calls.load(Ordering::SeqCst) == 1).await;

    let started = Instant::now();
    shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("monitor must return well before the poll interval")
        .unwrap();
    assert_eq!(outcome, HealthOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}
