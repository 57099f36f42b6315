use std::time::Duration;

use async_trait::async_trait;

use crate::error::WireError;
use crate::message::Message;
use crate::reqrep::ReplyToken;

/// Client side of request/reply: send a request, await the matching reply.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn request(&self, msg: Message, timeout: Duration) -> Result<Message, WireError>;
}

/// Server side of request/reply.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Receive the next request together with the token needed to answer it.
    async fn recv_request(&self) -> Result<(ReplyToken, Message), WireError>;

    /// Send one reply. Streamed replies call this repeatedly with the same
    /// token and correlation id.
    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), WireError>;
}
