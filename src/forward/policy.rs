//! Forwarding authorization policies
//!
//! Local forwarding asks a single yes/no question per `direct-tcpip` open.
//! Reverse forwarding reports every lifecycle step of a listener as a
//! [`ReverseForwardEvent`]; only the answer to [`ReverseForwardEvent::Query`]
//! decides anything, the other events are for bookkeeping.

use log::debug;
use std::net::SocketAddr;

use crate::config::{AddressRule, ForwardConfig, Result};
use crate::transport::ConnContext;

/// Decides whether a `direct-tcpip` destination may be dialed
pub trait LocalForwardPolicy: Send + Sync {
    /// Return `true` to permit dialing `dest_host:dest_port`
    fn allow(&self, ctx: &ConnContext, dest_host: &str, dest_port: u32) -> bool;
}

impl<F> LocalForwardPolicy for F
where
    F: Fn(&ConnContext, &str, u32) -> bool + Send + Sync,
{
    fn allow(&self, ctx: &ConnContext, dest_host: &str, dest_port: u32) -> bool {
        self(ctx, dest_host, dest_port)
    }
}

/// Lifecycle events of a reverse-forward listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseForwardEvent {
    /// A client asked to listen on `bind_addr`; the answer gates the listener
    Query {
        /// Host exactly as the client sent it
        bind_host: String,
        /// Resolved address the client asked for
        bind_addr: SocketAddr,
    },
    /// The listener is accepting connections
    Started {
        /// Resolved address the client asked for
        bind_addr: SocketAddr,
        /// Address the listener actually bound
        listener_addr: SocketAddr,
    },
    /// A connection was accepted and its `forwarded-tcpip` channel opened
    ChannelOpened {
        /// Address the listener is bound to
        listener_addr: SocketAddr,
        /// Local address of the accepted socket
        local_addr: SocketAddr,
        /// Peer address of the accepted socket
        peer_addr: SocketAddr,
    },
    /// A forwarded connection finished relaying
    ChannelClosed {
        /// Address the listener is bound to
        listener_addr: SocketAddr,
        /// Local address of the accepted socket
        local_addr: SocketAddr,
        /// Peer address of the accepted socket
        peer_addr: SocketAddr,
    },
    /// Forwarding on `bind_addr` stopped
    ///
    /// Sent once by an explicit cancel and again when the listener finishes
    /// draining, so one cancellation can produce two of these.
    Stopped {
        /// Resolved address the client asked for
        bind_addr: SocketAddr,
    },
}

impl ReverseForwardEvent {
    /// Legacy numeric signal code of the event
    pub fn signal(&self) -> i8 {
        match self {
            Self::Query { .. } => 0,
            Self::Started { .. } => 1,
            Self::ChannelOpened { .. } => 2,
            Self::ChannelClosed { .. } => -2,
            Self::Stopped { .. } => -1,
        }
    }
}

/// Decides whether a client may listen, and observes the listener afterwards
pub trait ReverseForwardPolicy: Send + Sync {
    /// Handle `event`; the return value only matters for [`ReverseForwardEvent::Query`]
    fn on_event(&self, ctx: &ConnContext, event: &ReverseForwardEvent) -> bool;
}

impl<F> ReverseForwardPolicy for F
where
    F: Fn(&ConnContext, &ReverseForwardEvent) -> bool + Send + Sync,
{
    fn on_event(&self, ctx: &ConnContext, event: &ReverseForwardEvent) -> bool {
        self(ctx, event)
    }
}

/// Policy driven by the `permitted_destinations` and `permitted_binds` rule lists
///
/// An empty list permits everything.
#[derive(Debug, Clone, Default)]
pub struct ConfigPolicy {
    destinations: Vec<AddressRule>,
    binds: Vec<AddressRule>,
}

impl ConfigPolicy {
    /// Create a policy from parsed rules
    pub fn new(destinations: Vec<AddressRule>, binds: Vec<AddressRule>) -> Self {
        Self { destinations, binds }
    }

    /// Parse the rule lists of `config`
    pub fn from_config(config: &ForwardConfig) -> Result<Self> {
        let destinations = config
            .permitted_destinations()
            .iter()
            .map(|rule| rule.parse())
            .collect::<Result<Vec<AddressRule>>>()?;
        let binds = config
            .permitted_binds()
            .iter()
            .map(|rule| rule.parse())
            .collect::<Result<Vec<AddressRule>>>()?;
        Ok(Self::new(destinations, binds))
    }

    fn permits(rules: &[AddressRule], host: &str, port: u32) -> bool {
        rules.is_empty() || rules.iter().any(|rule| rule.matches(host, port))
    }
}

impl LocalForwardPolicy for ConfigPolicy {
    fn allow(&self, ctx: &ConnContext, dest_host: &str, dest_port: u32) -> bool {
        let allowed = Self::permits(&self.destinations, dest_host, dest_port);
        if !allowed {
            debug!("Denied local forward to {}:{} for {}", dest_host, dest_port, ctx.remote_addr());
        }
        allowed
    }
}

impl ReverseForwardPolicy for ConfigPolicy {
    fn on_event(&self, ctx: &ConnContext, event: &ReverseForwardEvent) -> bool {
        match event {
            ReverseForwardEvent::Query { bind_host, bind_addr } => {
                let port = u32::from(bind_addr.port());
                let resolved = bind_addr.ip().to_string();
                // rules may name the host as requested or as resolved
                let allowed =
                    Self::permits(&self.binds, bind_host, port) || Self::permits(&self.binds, &resolved, port);
                if !allowed {
                    debug!("Denied remote forward on {} for {}", bind_addr, ctx.remote_addr());
                }
                allowed
            }
            _ => true,
        }
    }
}
