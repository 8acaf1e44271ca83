//! Per-connection context

use std::net::SocketAddr;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Context tied to the lifetime of one transport connection
///
/// Cloning is cheap; every clone observes the same cancellation. The
/// connection's owner calls [`ConnContext::cancel`] when the connection ends,
/// which tears down every remote-forward listener registered for it.
#[derive(Debug, Clone)]
pub struct ConnContext {
    token: CancellationToken,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl ConnContext {
    /// Create a context for a connection between `local_addr` and `remote_addr`
    pub fn new(remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            token: CancellationToken::new(),
            remote_addr,
            local_addr,
        }
    }

    /// Peer address of the connection
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Local address of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// End the connection context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context has ended
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context has ended
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The underlying token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
