//! The RPC surface an agent consumes from the authority.
//!
//! [`AuthorityClient`] is the seam the agent core is written against;
//! [`ZmqAuthorityClient`] is the production implementation over
//! [`ZmqRequestClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use rasp_core::{AgentIdentity, AgentKind};

use crate::error::WireError;
use crate::message::Message;
use crate::messages::topics;
use crate::messages::{AgentRequest, DetailResponse, NewRules, RegAgentRequest, RegAgentResponse};
use crate::reqrep::{ReplyStream, ZmqRequestClient};
use crate::traits::RequestSender;
use crate::transport::Transport;

/// What one receive on the rule subscription produced.
#[derive(Debug)]
pub enum StreamEvent {
    /// A complete rule set.
    Rules(NewRules),
    /// The authority closed the stream without an error.
    Ended,
    /// A receive failed; the stream may still deliver more items.
    Error(WireError),
}

/// A live rule subscription.
#[async_trait]
pub trait RuleStream: Send {
    async fn next_event(&mut self) -> StreamEvent;
}

#[async_trait]
pub trait AuthorityClient: Send + Sync {
    async fn register(
        &self,
        agent_name: &str,
        service_id: &str,
        kind: AgentKind,
    ) -> Result<RegAgentResponse, WireError>;

    async fn deregister(&self, identity: &AgentIdentity) -> Result<DetailResponse, WireError>;

    async fn subscribe_rules(&self, identity: &AgentIdentity) -> Result<Box<dyn RuleStream>, WireError>;

    /// Release the underlying connection.
    async fn close(&self);
}

pub struct ZmqAuthorityClient {
    client: ZmqRequestClient,
    request_timeout: Duration,
}

impl ZmqAuthorityClient {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport, request_timeout: Duration) -> Result<Self, WireError> {
        let client = ZmqRequestClient::connect(transport).await?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    async fn call<Req, Resp>(&self, topic: &str, payload: &Req) -> Result<Resp, WireError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let msg = Message::new(topic, payload)?;
        let reply = self.client.request(msg, self.request_timeout).await?;
        let expected = topics::reply(topic);
        if reply.topic != expected {
            return Err(WireError::UnexpectedReply(format!(
                "expected topic '{expected}', got '{}'",
                reply.topic
            )));
        }
        Ok(reply.decode()?)
    }
}

#[async_trait]
impl AuthorityClient for ZmqAuthorityClient {
    async fn register(
        &self,
        agent_name: &str,
        service_id: &str,
        kind: AgentKind,
    ) -> Result<RegAgentResponse, WireError> {
        let req = RegAgentRequest {
            agent_name: agent_name.to_string(),
            service_id: service_id.to_string(),
            agent_type: kind,
        };
        self.call(topics::AGENT_REGISTER, &req).await
    }

    async fn deregister(&self, identity: &AgentIdentity) -> Result<DetailResponse, WireError> {
        self.call(topics::AGENT_CLOSE, &AgentRequest::from(identity)).await
    }

    async fn subscribe_rules(&self, identity: &AgentIdentity) -> Result<Box<dyn RuleStream>, WireError> {
        let msg = Message::new(topics::RULES_SYNC, &AgentRequest::from(identity))?;
        let rx = self.client.request_stream(msg).await?;
        debug!(agent_id = %identity.agent_id, "rule subscription opened");
        Ok(Box::new(ZmqRuleStream { rx }))
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

struct ZmqRuleStream {
    rx: ReplyStream,
}

#[async_trait]
impl RuleStream for ZmqRuleStream {
    async fn next_event(&mut self) -> StreamEvent {
        match self.rx.recv().await {
            None => StreamEvent::Ended,
            Some(Err(e)) => StreamEvent::Error(e),
            Some(Ok(msg)) => match msg.decode::<NewRules>() {
                Ok(rules) => StreamEvent::Rules(rules),
                Err(e) => StreamEvent::Error(e.into()),
            },
        }
    }
}
