//! RPC plumbing between an agent and the rule authority.
//!
//! MessagePack envelopes travel over ZeroMQ DEALER/ROUTER sockets. Unary
//! calls are matched by correlation id; the rule subscription is a
//! server-streaming reply terminated by a `.done` topic.

pub mod authority;
pub mod error;
pub mod message;
pub mod messages;
pub mod reqrep;
pub mod traits;
pub mod transport;

pub use authority::{AuthorityClient, RuleStream, StreamEvent, ZmqAuthorityClient};
pub use error::WireError;
pub use message::Message;
pub use messages::authority as protocol;
pub use messages::topics;
pub use reqrep::{ReplyStream, ReplyToken, ZmqRequestClient, ZmqRequestServer};
pub use traits::{RequestHandler, RequestSender};
pub use transport::Transport;
