//! Full agent against a fake authority on a real ROUTER socket.

use std::sync::Arc;
use std::time::Duration;

use rasp_agent::{AgentLifecycle, ConnectionState, HealthMonitor, RaspAgent, SsrfAgent};
use rasp_core::Shutdown;
use rasp_wire::protocol::{AgentRequest, DetailResponse, RegAgentRequest, RegAgentResponse};
use rasp_wire::{topics, Message, RequestHandler, Transport, ZmqAuthorityClient, ZmqRequestServer};

use crate::mocks::{eventually, ssrf_hosts, ToggleProbe};

const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn stream_end_then_resume_over_zmq() {
    let transport = Transport::tcp("127.0.0.1", 17600);
    let server = ZmqRequestServer::bind(&transport).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let authority = tokio::spawn(async move {
        // Registration.
        let (token, msg) = server.recv_request().await.unwrap();
        assert_eq!(msg.topic, topics::AGENT_REGISTER);
        let req: RegAgentRequest = msg.decode().unwrap();
        let reply = Message::with_correlation(
            topics::reply(topics::AGENT_REGISTER),
            &RegAgentResponse {
                agent_id: format!("{}-7", req.agent_name),
                detail: "registered".into(),
            },
            msg.correlation_id,
        )
        .unwrap();
        server.send_reply(token, reply).await.unwrap();

        // First subscription: one rule set, then a clean end.
        let (token, msg) = server.recv_request().await.unwrap();
        assert_eq!(msg.topic, topics::RULES_SYNC);
        let item = Message::with_correlation(
            topics::reply(topics::RULES_SYNC),
            &ssrf_hosts(&["evil.one"]),
            msg.correlation_id,
        )
        .unwrap();
        server.send_reply(token.clone(), item).await.unwrap();
        let done = Message::with_correlation(topics::done(topics::RULES_SYNC), &(), msg.correlation_id).unwrap();
        server.send_reply(token, done).await.unwrap();

        // Re-subscription after the health check.
        let (token, msg) = server.recv_request().await.unwrap();
        assert_eq!(msg.topic, topics::RULES_SYNC);
        let req: AgentRequest = msg.decode().unwrap();
        assert_eq!(req.agent_id, "edge-7");
        let item = Message::with_correlation(
            topics::reply(topics::RULES_SYNC),
            &ssrf_hosts(&["evil.two"]),
            msg.correlation_id,
        )
        .unwrap();
        server.send_reply(token, item).await.unwrap();

        // Deregistration on shutdown.
        let (token, msg) = server.recv_request().await.unwrap();
        assert_eq!(msg.topic, topics::AGENT_CLOSE);
        let reply = Message::with_correlation(
            topics::reply(topics::AGENT_CLOSE),
            &DetailResponse {
                detail: "closed".into(),
            },
            msg.correlation_id,
        )
        .unwrap();
        server.send_reply(token, reply).await.unwrap();
    });

    let client = ZmqAuthorityClient::connect(&transport, Duration::from_secs(5)).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let probe = ToggleProbe::new(true);
    let lifecycle = AgentLifecycle::new(
        Arc::new(client),
        HealthMonitor::new(probe, Duration::from_millis(20)),
        Shutdown::new(),
    );
    let agent = SsrfAgent::new(lifecycle);
    agent.start("edge", "payments").await.unwrap();

    eventually("rules from the second stream", || agent.egress().check_host("evil.two")).await;
    assert!(!agent.egress().check_host("evil.one"));
    assert_eq!(agent.lifecycle().stats().reconnects(), 1);
    assert_eq!(agent.lifecycle().stats().installed(), 2);

    agent.shutdown("test done").await;
    assert_eq!(agent.lifecycle().state(), ConnectionState::Closed);
    tokio::time::timeout(Duration::from_secs(5), authority)
        .await
        .expect("authority script should finish")
        .unwrap();
}
