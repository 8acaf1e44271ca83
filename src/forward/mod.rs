//! Port forwarding (RFC4254 §7)
//!
//! [`handle_direct_tcpip`] serves client-initiated `direct-tcpip` channels.
//! [`RemoteForwardRegistry`] serves the `tcpip-forward` and
//! `cancel-tcpip-forward` global requests and opens `forwarded-tcpip`
//! channels back to the client for every connection its listeners accept.

mod local;
mod metrics;
mod policy;
mod remote;

pub use local::handle_direct_tcpip;
pub use metrics::MetricsPolicy;
pub use policy::{ConfigPolicy, LocalForwardPolicy, ReverseForwardEvent, ReverseForwardPolicy};
pub use remote::RemoteForwardRegistry;

use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::common::Result;
use crate::config::ForwardConfig;
use crate::relay::{Relay, DEFAULT_BUFFER_SIZE};
use crate::transport::{ConnContext, NewChannel, RejectReason};

/// Channel type of a client-initiated local forward
pub const DIRECT_TCPIP: &str = "direct-tcpip";

/// Channel type of a server-initiated reverse forward
pub const FORWARDED_TCPIP: &str = "forwarded-tcpip";

/// Global request asking the server to listen
pub const TCPIP_FORWARD: &str = "tcpip-forward";

/// Global request asking the server to stop listening
pub const CANCEL_TCPIP_FORWARD: &str = "cancel-tcpip-forward";

/// Policies and tuning shared by both forwarding directions
///
/// A missing policy disables that direction entirely.
#[derive(Clone)]
pub struct ForwardOptions {
    /// Authorizes `direct-tcpip` destinations
    pub local_policy: Option<Arc<dyn LocalForwardPolicy>>,
    /// Authorizes and observes `tcpip-forward` listeners
    pub reverse_policy: Option<Arc<dyn ReverseForwardPolicy>>,
    /// Relay buffer size in bytes
    pub buffer_size: usize,
    /// Upper bound for dialing a local-forward destination
    pub connect_timeout: Duration,
}

impl ForwardOptions {
    /// Options with both directions disabled
    pub fn new() -> Self {
        Self {
            local_policy: None,
            reverse_policy: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Enable local forwarding under `policy`
    pub fn with_local_policy(mut self, policy: impl LocalForwardPolicy + 'static) -> Self {
        self.local_policy = Some(Arc::new(policy));
        self
    }

    /// Enable reverse forwarding under `policy`
    pub fn with_reverse_policy(mut self, policy: impl ReverseForwardPolicy + 'static) -> Self {
        self.reverse_policy = Some(Arc::new(policy));
        self
    }

    /// Set the relay buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the local-forward dial timeout
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Build options from configuration
    ///
    /// Enabled directions get a [`ConfigPolicy`] wrapped in [`MetricsPolicy`].
    pub fn from_config(config: &ForwardConfig) -> Result<Self> {
        let policy = ConfigPolicy::from_config(config)?;
        let mut options = Self::new()
            .with_buffer_size(config.buffer_size())
            .with_connect_timeout(config.connect_timeout());

        if config.allow_local_forwarding() {
            options = options.with_local_policy(MetricsPolicy::new(policy.clone()));
        }
        if config.allow_remote_forwarding() {
            options = options.with_reverse_policy(MetricsPolicy::new(policy));
        }
        Ok(options)
    }
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ForwardOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardOptions")
            .field("local_policy", &self.local_policy.as_ref().map(|_| "<LocalForwardPolicy>"))
            .field("reverse_policy", &self.reverse_policy.as_ref().map(|_| "<ReverseForwardPolicy>"))
            .field("buffer_size", &self.buffer_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Route a channel-open request by type
///
/// `direct-tcpip` goes to [`handle_direct_tcpip`]; every other type is
/// refused with "unknown channel type".
pub async fn handle_channel<N: NewChannel>(
    options: &ForwardOptions,
    ctx: &ConnContext,
    new_channel: N,
) -> Option<Relay> {
    if new_channel.channel_type() == DIRECT_TCPIP {
        return handle_direct_tcpip(options, ctx, new_channel).await;
    }

    let message = format!("unknown channel type: {}", new_channel.channel_type());
    if let Err(e) = new_channel.reject(RejectReason::UnknownChannelType, &message).await {
        debug!("Failed to reject channel from {}: {}", ctx.remote_addr(), e);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValues, ValueSource};
    use crate::transport::memory;
    use crate::common::ForwardError;
    use bytes::Bytes;

    #[test]
    fn test_from_config_respects_switches() {
        let options = ForwardOptions::from_config(&ForwardConfig::default()).unwrap();
        assert!(options.local_policy.is_none());
        assert!(options.reverse_policy.is_none());

        let mut config = ForwardConfig::default();
        config.apply(
            ConfigValues {
                allow_remote_forwarding: Some(true),
                buffer_size: Some(1024),
                connect_timeout: Some(5),
                ..Default::default()
            },
            ValueSource::CommandLine,
        );
        let options = ForwardOptions::from_config(&config).unwrap();
        assert!(options.local_policy.is_none());
        assert!(options.reverse_policy.is_some());
        assert_eq!(options.buffer_size, 1024);
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unknown_channel_type_rejected() {
        let ctx = ConnContext::new("127.0.0.1:40000".parse().unwrap(), "127.0.0.1:22".parse().unwrap());
        let (new_channel, pending) = memory::channel_open("x11", Bytes::new());

        assert!(handle_channel(&ForwardOptions::new(), &ctx, new_channel).await.is_none());
        match pending.outcome().await {
            Err(ForwardError::ChannelRejected { reason, .. }) => {
                assert_eq!(reason, RejectReason::UnknownChannelType)
            }
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }
}
