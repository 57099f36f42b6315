//! Request/reply over ZeroMQ DEALER/ROUTER sockets.
//!
//! - [`ZmqRequestClient`] wraps a DEALER socket: unary requests and
//!   server-streamed replies, both matched by `correlation_id`
//! - [`ZmqRequestServer`] wraps a ROUTER socket (the authority side)
//! - [`ReplyToken`] is an opaque handle carrying the ZMQ identity frame
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! - DEALER sends: `[topic, envelope]`
//! - ROUTER receives: `[identity, topic, envelope]`
//! - ROUTER sends: `[identity, topic, envelope]`
//! - DEALER receives: `[topic, envelope]`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::error::WireError;
use crate::message::Message;
use crate::messages::ErrorResponse;
use crate::traits::{RequestHandler, RequestSender};
use crate::transport::Transport;

/// Items of a streamed reply. The channel closes after the `.done` reply.
///
/// Unbounded so a slow consumer never holds up the socket loop, which also
/// carries every unary reply.
pub type ReplyStream = mpsc::UnboundedReceiver<Result<Message, WireError>>;

/// Opaque token carrying the ZMQ routing identity bytes.
#[derive(Debug, Clone)]
pub struct ReplyToken {
    identity: Vec<u8>,
}

enum PendingReply {
    Single(oneshot::Sender<Result<Message, WireError>>),
    Stream(mpsc::UnboundedSender<Result<Message, WireError>>),
}

type PendingMap = Arc<Mutex<HashMap<Uuid, PendingReply>>>;

struct SendCommand {
    zmq_msg: ZmqMessage,
}

/// DEALER-socket client for issuing requests and awaiting replies.
///
/// The socket is owned by a background task that multiplexes outbound
/// requests (from an mpsc channel) with inbound replies (dispatched by
/// `correlation_id`).
pub struct ZmqRequestClient {
    send_tx: mpsc::Sender<SendCommand>,
    pending: PendingMap,
    loop_handle: JoinHandle<()>,
}

impl ZmqRequestClient {
    /// Connect a DEALER socket to a ROUTER endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, WireError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<SendCommand>(256);

        let loop_pending = Arc::clone(&pending);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, send_rx, Arc::clone(&loop_pending)).await;
            fail_pending(&loop_pending, "connection closed").await;
        });

        Ok(Self {
            send_tx,
            pending,
            loop_handle,
        })
    }

    async fn event_loop(
        mut socket: DealerSocket,
        mut send_rx: mpsc::Receiver<SendCommand>,
        pending: PendingMap,
    ) {
        loop {
            tokio::select! {
                Some(cmd) = send_rx.recv() => {
                    if let Err(e) = socket.send(cmd.zmq_msg).await {
                        warn!(error = %e, "DEALER send failed");
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => {
                            Self::dispatch_reply(&pending, zmq_msg).await;
                        }
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    /// Route an inbound reply to the correct pending caller.
    async fn dispatch_reply(pending: &Mutex<HashMap<Uuid, PendingReply>>, zmq_msg: ZmqMessage) {
        let frames: Vec<_> = zmq_msg.iter().collect();

        // Skip leading empty delimiter frames.
        let data_frames: Vec<_> = frames
            .iter()
            .skip_while(|f| f.as_ref().is_empty())
            .collect();

        if data_frames.len() < 2 {
            warn!(
                raw_frame_count = frames.len(),
                data_frame_count = data_frames.len(),
                "unexpected frame count on DEALER recv"
            );
            return;
        }

        let message = match Message::from_bytes(data_frames[1].as_ref()) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to decode reply envelope");
                return;
            }
        };

        let cid = message.correlation_id;
        let mut map = pending.lock().await;

        match map.remove(&cid) {
            Some(PendingReply::Single(tx)) => {
                let _ = tx.send(into_result(message));
            }
            Some(PendingReply::Stream(tx)) => {
                if message.is_stream_end() {
                    // Dropping the sender closes the stream cleanly.
                    debug!(correlation_id = %cid, "stream ended by peer");
                    return;
                }
                let terminal = message.is_error();
                if tx.send(into_result(message)).is_err() {
                    debug!(correlation_id = %cid, "stream receiver dropped");
                    return;
                }
                if !terminal {
                    map.insert(cid, PendingReply::Stream(tx));
                }
            }
            None => {
                debug!(correlation_id = %cid, "received reply for unknown correlation_id");
            }
        }
    }

    /// Send a request and return a receiver for its streamed replies.
    ///
    /// The receiver yields replies until the peer sends `.done`, at which
    /// point it returns `None`. A lost connection yields one
    /// `WireError::Transport` before the stream ends.
    pub async fn request_stream(&self, msg: Message) -> Result<ReplyStream, WireError> {
        let cid = msg.correlation_id;
        let (tx, rx) = mpsc::unbounded_channel();

        self.pending.lock().await.insert(cid, PendingReply::Stream(tx));

        if let Err(e) = self.enqueue_send(&msg).await {
            self.pending.lock().await.remove(&cid);
            return Err(e);
        }
        debug!(correlation_id = %cid, topic = %msg.topic, "sent streaming request");
        Ok(rx)
    }

    /// Stop the socket loop and fail every outstanding request.
    pub async fn close(&self) {
        self.loop_handle.abort();
        fail_pending(&self.pending, "client closed").await;
        info!("request client closed");
    }

    async fn enqueue_send(&self, msg: &Message) -> Result<(), WireError> {
        let envelope_bytes = msg.to_bytes()?;
        let mut zmq_msg = ZmqMessage::from(msg.topic.as_str());
        zmq_msg.push_back(envelope_bytes.into());

        self.send_tx
            .send(SendCommand { zmq_msg })
            .await
            .map_err(|_| WireError::Transport("client event loop closed".into()))
    }
}

impl Drop for ZmqRequestClient {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

/// Turn an `.error` reply into `WireError::Rejected`.
fn into_result(message: Message) -> Result<Message, WireError> {
    if !message.is_error() {
        return Ok(message);
    }
    let reason = message
        .decode::<ErrorResponse>()
        .map(|e| e.message)
        .unwrap_or_else(|_| message.topic.clone());
    Err(WireError::Rejected(reason))
}

async fn fail_pending(pending: &Mutex<HashMap<Uuid, PendingReply>>, reason: &str) {
    let drained: Vec<_> = pending.lock().await.drain().collect();
    for (_, entry) in drained {
        let err = WireError::Transport(reason.to_string());
        match entry {
            PendingReply::Single(tx) => {
                let _ = tx.send(Err(err));
            }
            PendingReply::Stream(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

#[async_trait]
impl RequestSender for ZmqRequestClient {
    /// Send a request and wait for a single reply matched by `correlation_id`.
    async fn request(&self, msg: Message, timeout_dur: Duration) -> Result<Message, WireError> {
        let cid = msg.correlation_id;
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(cid, PendingReply::Single(tx));

        if let Err(e) = self.enqueue_send(&msg).await {
            self.pending.lock().await.remove(&cid);
            return Err(e);
        }
        debug!(correlation_id = %cid, topic = %msg.topic, "sent request");

        match tokio::time::timeout(timeout_dur, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&cid);
                Err(WireError::Transport("reply channel closed unexpectedly".into()))
            }
            Err(_) => {
                self.pending.lock().await.remove(&cid);
                Err(WireError::Timeout(timeout_dur))
            }
        }
    }
}

/// ROUTER-socket server, the authority side of the protocol.
pub struct ZmqRequestServer {
    socket: Mutex<RouterSocket>,
}

impl ZmqRequestServer {
    /// Bind a ROUTER socket on the given transport endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, WireError> {
        transport
            .ensure_ipc_dir()
            .map_err(|e| WireError::Transport(e.to_string()))?;
        transport
            .remove_stale_socket()
            .map_err(|e| WireError::Transport(e.to_string()))?;
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl RequestHandler for ZmqRequestServer {
    async fn recv_request(&self) -> Result<(ReplyToken, Message), WireError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        let frames: Vec<_> = zmq_msg.iter().collect();

        if frames.len() < 2 {
            return Err(WireError::Transport(format!(
                "expected at least 2 frames from ROUTER, got {}",
                frames.len()
            )));
        }

        let identity = frames[0].as_ref().to_vec();

        let data_frames: Vec<_> = frames[1..]
            .iter()
            .skip_while(|f| f.as_ref().is_empty())
            .collect();

        if data_frames.len() < 2 {
            return Err(WireError::Transport(format!(
                "expected [topic, envelope] after identity, got {} data frames",
                data_frames.len()
            )));
        }

        let message = Message::from_bytes(data_frames[1].as_ref())?;

        debug!(
            correlation_id = %message.correlation_id,
            topic = %message.topic,
            "received request"
        );

        Ok((ReplyToken { identity }, message))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), WireError> {
        let envelope_bytes = reply.to_bytes()?;

        let mut zmq_msg = ZmqMessage::from(token.identity);
        zmq_msg.push_back(reply.topic.as_bytes().to_vec().into());
        zmq_msg.push_back(envelope_bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(
            correlation_id = %reply.correlation_id,
            topic = %reply.topic,
            "sent reply"
        );
        Ok(())
    }
}
