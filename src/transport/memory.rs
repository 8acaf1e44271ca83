//! In-memory transport
//!
//! Channels are backed by [`tokio::io::duplex`] pipes and requests by
//! unbounded queues. [`pair`] gives a server-side [`MemoryConnection`] whose
//! `open_channel` calls arrive at the client-side [`MemoryPeer`], and
//! [`channel_open`] builds a client-initiated open request for the
//! `direct-tcpip` handler. This lets both forwarding directions run end to
//! end without a real secure transport.

use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use std::net::SocketAddr;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;

use super::{Connection, NewChannel, RejectReason, Request};
use crate::common::{ForwardError, Result};

/// Capacity of each direction of an in-memory channel
pub const CHANNEL_BUFFER_SIZE: usize = 64 * 1024;

/// Requests arriving on an in-memory channel
pub type MemoryRequests = mpsc::UnboundedReceiver<Request>;

#[derive(Debug)]
enum Decision {
    Accepted(OpenedChannel),
    Rejected { reason: RejectReason, message: String },
}

/// The opener's end of an accepted channel
#[derive(Debug)]
pub struct OpenedChannel {
    /// Channel byte stream
    pub stream: DuplexStream,
    /// Requests sent by the accepting side
    pub requests: MemoryRequests,
    request_tx: mpsc::UnboundedSender<Request>,
}

impl OpenedChannel {
    /// Send a channel request to the accepting side
    pub fn send_request(&self, request: Request) -> Result<()> {
        self.request_tx
            .unbounded_send(request)
            .map_err(|_| ForwardError::Transport("channel is closed".to_string()))
    }
}

/// A channel-open request waiting for [`NewChannel::accept`] or [`NewChannel::reject`]
#[derive(Debug)]
pub struct MemoryNewChannel {
    channel_type: String,
    extra_data: Bytes,
    decision: oneshot::Sender<Decision>,
}

/// The opener's view of a channel-open request
#[derive(Debug)]
pub struct PendingChannel {
    decision: oneshot::Receiver<Decision>,
}

impl PendingChannel {
    /// Wait for the accepting side to decide
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::ChannelRejected`] when the channel was refused
    /// and [`ForwardError::Transport`] when the request was dropped unanswered.
    pub async fn outcome(self) -> Result<OpenedChannel> {
        match self.decision.await {
            Ok(Decision::Accepted(channel)) => Ok(channel),
            Ok(Decision::Rejected { reason, message }) => {
                Err(ForwardError::ChannelRejected { reason, message })
            }
            Err(_) => Err(ForwardError::Transport(
                "channel-open request dropped without an answer".to_string(),
            )),
        }
    }
}

/// Create a channel-open request of `channel_type` carrying `extra_data`
pub fn channel_open(channel_type: impl Into<String>, extra_data: Bytes) -> (MemoryNewChannel, PendingChannel) {
    let (tx, rx) = oneshot::channel();
    let new_channel = MemoryNewChannel {
        channel_type: channel_type.into(),
        extra_data,
        decision: tx,
    };
    (new_channel, PendingChannel { decision: rx })
}

impl NewChannel for MemoryNewChannel {
    type Channel = DuplexStream;
    type Requests = MemoryRequests;

    fn channel_type(&self) -> &str {
        &self.channel_type
    }

    fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    async fn accept(self) -> Result<(DuplexStream, MemoryRequests)> {
        let (ours, theirs) = tokio::io::duplex(CHANNEL_BUFFER_SIZE);
        let (to_acceptor, acceptor_requests) = mpsc::unbounded();
        let (to_opener, opener_requests) = mpsc::unbounded();

        let opened = OpenedChannel {
            stream: theirs,
            requests: opener_requests,
            request_tx: to_acceptor,
        };
        self.decision
            .send(Decision::Accepted(opened))
            .map_err(|_| ForwardError::Transport("channel opener went away".to_string()))?;

        // Nothing on this side sends requests back to the opener yet.
        drop(to_opener);
        Ok((ours, acceptor_requests))
    }

    async fn reject(self, reason: RejectReason, message: &str) -> Result<()> {
        self.decision
            .send(Decision::Rejected {
                reason,
                message: message.to_string(),
            })
            .map_err(|_| ForwardError::Transport("channel opener went away".to_string()))
    }
}

/// Server side of an in-memory connection
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    remote_addr: SocketAddr,
    incoming: mpsc::UnboundedSender<MemoryNewChannel>,
}

/// Client side of an in-memory connection
#[derive(Debug)]
pub struct MemoryPeer {
    incoming: mpsc::UnboundedReceiver<MemoryNewChannel>,
}

impl MemoryPeer {
    /// Next channel the server opened, or `None` once every connection handle is gone
    pub async fn next_channel(&mut self) -> Option<MemoryNewChannel> {
        self.incoming.next().await
    }
}

/// Create a connected server/client pair; `remote_addr` is the client's address
pub fn pair(remote_addr: SocketAddr) -> (MemoryConnection, MemoryPeer) {
    let (tx, rx) = mpsc::unbounded();
    (
        MemoryConnection {
            remote_addr,
            incoming: tx,
        },
        MemoryPeer { incoming: rx },
    )
}

impl Connection for MemoryConnection {
    type Channel = DuplexStream;
    type Requests = MemoryRequests;

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn open_channel(&self, channel_type: &str, extra_data: Bytes) -> Result<(DuplexStream, MemoryRequests)> {
        let (new_channel, pending) = channel_open(channel_type, extra_data);
        self.incoming
            .unbounded_send(new_channel)
            .map_err(|_| ForwardError::Transport("peer is not accepting channels".to_string()))?;

        let opened = pending.outcome().await?;
        Ok((opened.stream, opened.requests))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_open_accept_and_transfer() {
        let (conn, mut peer) = pair("127.0.0.1:50000".parse().unwrap());

        let opener = tokio::spawn(async move {
            let (mut stream, _requests) = conn.open_channel("session", Bytes::new()).await?;
            stream.write_all(b"ping").await?;
            Ok::<_, ForwardError>(())
        });

        let new_channel = peer.next_channel().await.unwrap();
        assert_eq!(new_channel.channel_type(), "session");
        let (mut stream, _requests) = new_channel.accept().await.unwrap();

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        opener.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reject_reaches_opener() {
        let (new_channel, pending) = channel_open("direct-tcpip", Bytes::from_static(b"junk"));
        assert_eq!(new_channel.extra_data(), b"junk");
        new_channel
            .reject(RejectReason::AdministrativelyProhibited, "no")
            .await
            .unwrap();

        match pending.outcome().await {
            Err(ForwardError::ChannelRejected { reason, message }) => {
                assert_eq!(reason, RejectReason::AdministrativelyProhibited);
                assert_eq!(message, "no");
            }
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_dropped_request_is_a_transport_error() {
        let (new_channel, pending) = channel_open("direct-tcpip", Bytes::new());
        drop(new_channel);
        assert!(matches!(pending.outcome().await, Err(ForwardError::Transport(_))));
    }
}
