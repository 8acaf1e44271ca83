//! Secure transport abstraction
//!
//! The forwarding handlers never touch encryption, authentication or framing.
//! They only need to open and accept multiplexed channels, answer requests,
//! and know when the owning connection goes away. A transport implementation
//! provides those primitives through the traits in this module.

mod context;
mod discard;
pub mod memory;

pub use context::ConnContext;
pub use discard::{discard_requests, spawn_discard_requests};

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::common::Result;

/// Channel-open failure reason codes (RFC4254 §5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// SSH_OPEN_ADMINISTRATIVELY_PROHIBITED
    AdministrativelyProhibited,
    /// SSH_OPEN_CONNECT_FAILED
    ConnectFailed,
    /// SSH_OPEN_UNKNOWN_CHANNEL_TYPE
    UnknownChannelType,
    /// SSH_OPEN_RESOURCE_SHORTAGE
    ResourceShortage,
}

impl RejectReason {
    /// Numeric code sent on the wire
    pub fn code(self) -> u32 {
        match self {
            Self::AdministrativelyProhibited => 1,
            Self::ConnectFailed => 2,
            Self::UnknownChannelType => 3,
            Self::ResourceShortage => 4,
        }
    }

    /// Map a wire code back to a reason
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::AdministrativelyProhibited),
            2 => Some(Self::ConnectFailed),
            3 => Some(Self::UnknownChannelType),
            4 => Some(Self::ResourceShortage),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdministrativelyProhibited => write!(f, "administratively prohibited"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::UnknownChannelType => write!(f, "unknown channel type"),
            Self::ResourceShortage => write!(f, "resource shortage"),
        }
    }
}

/// Answer to a global or channel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Whether the request was handled (SSH_MSG_REQUEST_SUCCESS)
    pub handled: bool,
    /// Reply payload; for failures this is an optional explanation
    pub payload: Bytes,
}

impl Reply {
    /// A success reply carrying `payload`
    pub fn handled(payload: Bytes) -> Self {
        Self { handled: true, payload }
    }

    /// A failure reply carrying `payload`
    pub fn not_handled(payload: Bytes) -> Self {
        Self { handled: false, payload }
    }

    /// A failure reply with a human readable explanation
    pub fn rejected(message: &'static str) -> Self {
        Self::not_handled(Bytes::from_static(message.as_bytes()))
    }
}

/// A typed request received on a connection or channel
#[derive(Debug)]
pub struct Request {
    kind: String,
    want_reply: bool,
    payload: Bytes,
    reply_tx: Option<oneshot::Sender<Reply>>,
}

impl Request {
    /// Create a request that does not expect a reply
    pub fn new(kind: impl Into<String>, payload: Bytes) -> Self {
        Self {
            kind: kind.into(),
            want_reply: false,
            payload,
            reply_tx: None,
        }
    }

    /// Create a request together with the receiver its reply arrives on
    pub fn with_reply(kind: impl Into<String>, payload: Bytes) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            kind: kind.into(),
            want_reply: true,
            payload,
            reply_tx: Some(tx),
        };
        (request, rx)
    }

    /// Request type, e.g. `tcpip-forward`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the sender waits for a reply
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Raw request payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Send the reply, if one was requested
    pub fn reply(self, reply: Reply) {
        if let Some(tx) = self.reply_tx {
            // The requester may have given up waiting.
            let _ = tx.send(reply);
        }
    }
}

/// A connection able to open channels towards the peer
pub trait Connection: Send + Sync + 'static {
    /// Byte stream of an open channel
    type Channel: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Requests arriving on an open channel
    type Requests: Stream<Item = Request> + Unpin + Send + 'static;

    /// Address of the remote peer
    fn remote_addr(&self) -> SocketAddr;

    /// Open a channel of `channel_type` with `extra_data` and wait for the peer's answer
    fn open_channel(
        &self,
        channel_type: &str,
        extra_data: Bytes,
    ) -> impl Future<Output = Result<(Self::Channel, Self::Requests)>> + Send;
}

/// A channel-open request received from the peer, awaiting a decision
pub trait NewChannel: Send + 'static {
    /// Byte stream of the channel once accepted
    type Channel: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Requests arriving on the channel once accepted
    type Requests: Stream<Item = Request> + Unpin + Send + 'static;

    /// Channel type, e.g. `direct-tcpip`
    fn channel_type(&self) -> &str;

    /// Type specific data sent with the open request
    fn extra_data(&self) -> &[u8];

    /// Confirm the channel
    fn accept(self) -> impl Future<Output = Result<(Self::Channel, Self::Requests)>> + Send;

    /// Refuse the channel with a reason code and message
    fn reject(self, reason: RejectReason, message: &str) -> impl Future<Output = Result<()>> + Send;
}
