//! Forwarding metrics
//!
//! Records counters and gauges through the `metrics` facade while leaving
//! every decision to the wrapped policy. Nothing is recorded unless the
//! application installs a recorder.

use metrics::{counter, gauge};

use super::policy::{LocalForwardPolicy, ReverseForwardEvent, ReverseForwardPolicy};
use crate::transport::ConnContext;

/// Policy wrapper that records forwarding activity
#[derive(Debug, Clone)]
pub struct MetricsPolicy<P> {
    inner: P,
}

impl<P> MetricsPolicy<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

fn decision(allowed: bool) -> &'static str {
    if allowed { "allowed" } else { "denied" }
}

impl<P: LocalForwardPolicy> LocalForwardPolicy for MetricsPolicy<P> {
    fn allow(&self, ctx: &ConnContext, dest_host: &str, dest_port: u32) -> bool {
        let allowed = self.inner.allow(ctx, dest_host, dest_port);
        counter!("tcpip_forward_local_requests_total", "decision" => decision(allowed)).increment(1);
        allowed
    }
}

impl<P: ReverseForwardPolicy> ReverseForwardPolicy for MetricsPolicy<P> {
    fn on_event(&self, ctx: &ConnContext, event: &ReverseForwardEvent) -> bool {
        let result = self.inner.on_event(ctx, event);
        match event {
            ReverseForwardEvent::Query { .. } => {
                counter!("tcpip_forward_remote_requests_total", "decision" => decision(result)).increment(1);
            }
            ReverseForwardEvent::Started { .. } => {
                counter!("tcpip_forward_remote_listeners_started_total").increment(1);
            }
            ReverseForwardEvent::ChannelOpened { .. } => {
                counter!("tcpip_forward_remote_channels_total").increment(1);
                gauge!("tcpip_forward_remote_channels_active").increment(1.0);
            }
            ReverseForwardEvent::ChannelClosed { .. } => {
                gauge!("tcpip_forward_remote_channels_active").decrement(1.0);
            }
            // may fire twice per cancellation, so only counted
            ReverseForwardEvent::Stopped { .. } => {
                counter!("tcpip_forward_remote_listeners_stopped_total").increment(1);
            }
        }
        result
    }
}
