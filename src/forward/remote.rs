//! Remote forwarding registry
//!
//! This module serves the `tcpip-forward` and `cancel-tcpip-forward` global
//! requests. Every accepted forward owns a TCP listener; each connection
//! accepted on it is carried back to the client over a `forwarded-tcpip`
//! channel.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::policy::{ReverseForwardEvent, ReverseForwardPolicy};
use super::{ForwardOptions, CANCEL_TCPIP_FORWARD, FORWARDED_TCPIP, TCPIP_FORWARD};
use crate::common::{host_and_port, join_host_port, resolve_tcp_addr};
use crate::relay::relay;
use crate::transport::{spawn_discard_requests, ConnContext, Connection, Reply, Request};
use crate::wire::{
    RemoteForwardCancelRequest, RemoteForwardChannelData, RemoteForwardRequest, RemoteForwardSuccess,
    WireDecode, WireEncode,
};

/// Handle to a live listener; closing is idempotent
#[derive(Debug, Clone)]
struct ListenerHandle {
    closed: CancellationToken,
}

impl ListenerHandle {
    fn close(&self) {
        self.closed.cancel();
    }
}

struct RegistryInner {
    options: ForwardOptions,
    forwards: Mutex<HashMap<String, ListenerHandle>>,
}

/// Registry of the reverse forwards requested on connections
///
/// Keys are the literal `bind_addr:bind_port` strings of the requests and
/// hold at most one listener each; a request for a key that is still
/// registered is refused. Clones share the same registry, and one registry
/// may serve many connections.
#[derive(Clone)]
pub struct RemoteForwardRegistry {
    inner: Arc<RegistryInner>,
}

/// Everything a listener task needs besides the socket
struct ListenerScope<C> {
    registry: RemoteForwardRegistry,
    ctx: ConnContext,
    conn: Arc<C>,
    policy: Arc<dyn ReverseForwardPolicy>,
    key: String,
    handle: ListenerHandle,
    bind_host: String,
    bind_addr: SocketAddr,
    listener_addr: SocketAddr,
}

impl RemoteForwardRegistry {
    /// Create an empty registry
    pub fn new(options: ForwardOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                options,
                forwards: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether a listener is registered under `key` (`host:port` as requested)
    pub fn is_forwarding(&self, key: &str) -> bool {
        self.forwards().contains_key(key)
    }

    /// Keys of every registered listener, sorted
    pub fn active_forwards(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.forwards().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Answer one global request
    ///
    /// `tcpip-forward` and `cancel-tcpip-forward` are served; every other
    /// request type is not handled.
    pub async fn handle_request<C: Connection>(
        &self,
        ctx: &ConnContext,
        conn: &Arc<C>,
        kind: &str,
        payload: &[u8],
    ) -> Reply {
        match kind {
            TCPIP_FORWARD => self.tcpip_forward(ctx, conn, payload).await,
            CANCEL_TCPIP_FORWARD => self.cancel_tcpip_forward(ctx, payload).await,
            _ => {
                debug!("Ignoring global request {} from {}", kind, ctx.remote_addr());
                Reply::not_handled(Bytes::new())
            }
        }
    }

    /// Answer global requests until the stream ends or the context is cancelled
    pub async fn serve_requests<C, S>(&self, ctx: ConnContext, conn: Arc<C>, mut requests: S)
    where
        C: Connection,
        S: Stream<Item = Request> + Unpin,
    {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                next = requests.next() => match next {
                    Some(request) => {
                        let reply = self.handle_request(&ctx, &conn, request.kind(), request.payload()).await;
                        request.reply(reply);
                    }
                    None => break,
                },
            }
        }
        debug!("Stopped serving global requests for {}", ctx.remote_addr());
    }

    async fn tcpip_forward<C: Connection>(&self, ctx: &ConnContext, conn: &Arc<C>, payload: &[u8]) -> Reply {
        let request = match RemoteForwardRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed tcpip-forward request from {}: {}", ctx.remote_addr(), e);
                return Reply::not_handled(Bytes::new());
            }
        };

        let Some(policy) = self.inner.options.reverse_policy.clone() else {
            return Reply::rejected("port forwarding is disabled");
        };

        let bind_addr = match resolve_tcp_addr(&request.bind_addr, request.bind_port).await {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Invalid tcpip-forward address from {}: {}", ctx.remote_addr(), e);
                return Reply::rejected("port forwarding disabled - invalid address requested");
            }
        };

        let query = ReverseForwardEvent::Query {
            bind_host: request.bind_addr.clone(),
            bind_addr,
        };
        if !policy.on_event(ctx, &query) {
            return Reply::rejected("port forwarding is rejected");
        }

        let key = join_host_port(&request.bind_addr, request.bind_port);
        if self.is_forwarding(&key) {
            warn!("Refusing duplicate forward {} for {}", key, ctx.remote_addr());
            return Reply::rejected("port forwarding is already active for this address");
        }

        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to listen on {} for {}: {}", bind_addr, ctx.remote_addr(), e);
                return Reply::not_handled(Bytes::new());
            }
        };
        let listener_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to read listener address for {}: {}", bind_addr, e);
                return Reply::not_handled(Bytes::new());
            }
        };

        // A child token closes the listener when the connection context ends.
        let handle = ListenerHandle {
            closed: ctx.token().child_token(),
        };
        // an identical request may have registered while this one was binding
        match self.forwards().entry(key.clone()) {
            Entry::Occupied(_) => {
                warn!("Refusing duplicate forward {} for {}", key, ctx.remote_addr());
                return Reply::rejected("port forwarding is already active for this address");
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        policy.on_event(ctx, &ReverseForwardEvent::Started { bind_addr, listener_addr });

        info!("Forwarding {} ({}) for {}", key, listener_addr, ctx.remote_addr());

        let scope = ListenerScope {
            registry: self.clone(),
            ctx: ctx.clone(),
            conn: Arc::clone(conn),
            policy,
            key,
            handle,
            bind_host: request.bind_addr,
            bind_addr,
            listener_addr,
        };
        tokio::spawn(accept_loop(scope, listener));

        let success = RemoteForwardSuccess {
            bound_port: u32::from(listener_addr.port()),
        };
        Reply::handled(success.encode())
    }

    async fn cancel_tcpip_forward(&self, ctx: &ConnContext, payload: &[u8]) -> Reply {
        let request = match RemoteForwardCancelRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed cancel-tcpip-forward request from {}: {}", ctx.remote_addr(), e);
                return Reply::not_handled(Bytes::new());
            }
        };

        let bind_addr = match resolve_tcp_addr(&request.bind_addr, request.bind_port).await {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Invalid cancel-tcpip-forward address from {}: {}", ctx.remote_addr(), e);
                return Reply::rejected("port forwarding cancellation rejected - invalid address requested");
            }
        };

        let key = join_host_port(&request.bind_addr, request.bind_port);
        let handle = self.forwards().get(&key).cloned();

        if let Some(policy) = &self.inner.options.reverse_policy {
            policy.on_event(ctx, &ReverseForwardEvent::Stopped { bind_addr });
        }

        match handle {
            Some(handle) => {
                handle.close();
                info!("Cancelled forward {} for {}", key, ctx.remote_addr());
            }
            None => debug!("No forward {} to cancel for {}", key, ctx.remote_addr()),
        }
        Reply::handled(Bytes::new())
    }

    fn forwards(&self) -> MutexGuard<'_, HashMap<String, ListenerHandle>> {
        self.inner.forwards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn accept_loop<C: Connection>(scope: ListenerScope<C>, listener: TcpListener) {
    let scope = Arc::new(scope);
    let mut tasks = JoinSet::new();

    loop {
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!("Forwarded connection task on {} failed: {}", scope.listener_addr, e);
            }
        }

        tokio::select! {
            _ = scope.handle.closed.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    tasks.spawn(forward_connection(Arc::clone(&scope), socket));
                }
                Err(e) => {
                    error!("Accept failed on {}: {}", scope.listener_addr, e);
                    break;
                }
            },
        }
    }

    drop(listener);
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Forwarded connection task on {} failed: {}", scope.listener_addr, e);
        }
    }

    // duplicates are refused, so the entry under this key is still ours
    scope.registry.forwards().remove(&scope.key);
    scope
        .policy
        .on_event(&scope.ctx, &ReverseForwardEvent::Stopped { bind_addr: scope.bind_addr });
    info!("Stopped forwarding {} for {}", scope.key, scope.ctx.remote_addr());
}

async fn forward_connection<C: Connection>(scope: Arc<ListenerScope<C>>, socket: TcpStream) {
    let (local_addr, peer_addr) = match (socket.local_addr(), socket.peer_addr()) {
        (Ok(local), Ok(peer)) => (local, peer),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Dropping connection on {}: cannot read socket addresses: {}", scope.listener_addr, e);
            return;
        }
    };

    let (origin_host, origin_port) = host_and_port(&peer_addr);
    let data = RemoteForwardChannelData {
        dest_host: scope.bind_host.clone(),
        dest_port: u32::from(scope.listener_addr.port()),
        origin_host,
        origin_port,
    };

    let opened = tokio::select! {
        _ = scope.ctx.cancelled() => {
            debug!("Connection from {} dropped, {} is closing", peer_addr, scope.ctx.remote_addr());
            return;
        }
        opened = scope.conn.open_channel(FORWARDED_TCPIP, data.encode()) => opened,
    };
    let (channel, requests) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Failed to open forwarded-tcpip channel to {}: {}", scope.ctx.remote_addr(), e);
            return;
        }
    };

    let opened_event = ReverseForwardEvent::ChannelOpened {
        listener_addr: scope.listener_addr,
        local_addr,
        peer_addr,
    };
    scope.policy.on_event(&scope.ctx, &opened_event);
    spawn_discard_requests(&scope.ctx, requests);

    let stats = relay(channel, socket, scope.buffer_size()).wait().await;

    let closed_event = ReverseForwardEvent::ChannelClosed {
        listener_addr: scope.listener_addr,
        local_addr,
        peer_addr,
    };
    scope.policy.on_event(&scope.ctx, &closed_event);
    debug!(
        "Forwarded connection {} -> {} closed ({} bytes in, {} bytes out)",
        peer_addr, scope.key, stats.b_to_a, stats.a_to_b
    );
}

impl<C> ListenerScope<C> {
    fn buffer_size(&self) -> usize {
        self.registry.inner.options.buffer_size
    }
}
