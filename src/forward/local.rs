//! Local forwarding handler
//!
//! This module serves `direct-tcpip` channels: the client names a
//! destination, the server dials it and relays bytes between the channel
//! and the dialed socket.

use log::{debug, info};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::ForwardOptions;
use crate::common::join_host_port;
use crate::relay::{relay, Relay};
use crate::transport::{spawn_discard_requests, ConnContext, NewChannel, RejectReason};
use crate::wire::{LocalForwardOpenData, WireDecode};

/// Handle a `direct-tcpip` channel-open request
///
/// # Parameters
///
/// * `options` - Forwarding policies and tuning
/// * `ctx` - Context of the connection the request arrived on
/// * `new_channel` - The pending channel-open request
///
/// # Returns
///
/// The running [`Relay`] when the channel was accepted, `None` when it was
/// rejected or could not be set up. Dropping the relay leaves it running.
pub async fn handle_direct_tcpip<N: NewChannel>(
    options: &ForwardOptions,
    ctx: &ConnContext,
    new_channel: N,
) -> Option<Relay> {
    let decoded = LocalForwardOpenData::decode(new_channel.extra_data());
    let data = match decoded {
        Ok(data) => data,
        Err(e) => {
            let message = format!("error parsing forward data: {}", e);
            reject(ctx, new_channel, RejectReason::ConnectFailed, &message).await;
            return None;
        }
    };

    let allowed = options
        .local_policy
        .as_ref()
        .is_some_and(|policy| policy.allow(ctx, &data.dest_host, data.dest_port));
    if !allowed {
        reject(ctx, new_channel, RejectReason::AdministrativelyProhibited, "port forwarding is disabled").await;
        return None;
    }

    let dest = join_host_port(&data.dest_host, data.dest_port);
    debug!(
        "Local forward from {} ({}:{}) to {}",
        ctx.remote_addr(),
        data.origin_host,
        data.origin_port,
        dest
    );

    let socket = match dial(ctx, &dest, options.connect_timeout).await {
        Ok(socket) => socket,
        Err(e) => {
            reject(ctx, new_channel, RejectReason::ConnectFailed, &e.to_string()).await;
            return None;
        }
    };

    let (channel, requests) = match new_channel.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            debug!("Failed to accept direct-tcpip channel from {}: {}", ctx.remote_addr(), e);
            return None;
        }
    };
    spawn_discard_requests(ctx, requests);

    info!("Forwarding {} to {}", ctx.remote_addr(), dest);
    Some(relay(channel, socket, options.buffer_size))
}

/// Connect to `dest`, giving up on timeout or when the connection context ends
async fn dial(ctx: &ConnContext, dest: &str, connect_timeout: Duration) -> io::Result<TcpStream> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "connection closed while dialing")),
        result = timeout(connect_timeout, TcpStream::connect(dest)) => match result {
            Ok(connected) => connected,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, format!("dial {}: connection timed out", dest))),
        },
    }
}

async fn reject<N: NewChannel>(ctx: &ConnContext, new_channel: N, reason: RejectReason, message: &str) {
    debug!("Rejecting direct-tcpip from {} ({}): {}", ctx.remote_addr(), reason, message);
    if let Err(e) = new_channel.reject(reason, message).await {
        debug!("Failed to send rejection to {}: {}", ctx.remote_addr(), e);
    }
}
