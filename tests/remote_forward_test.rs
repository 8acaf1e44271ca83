//! Remote forwarding tests
//!
//! These tests drive the registry through global requests on an in-memory
//! connection and real TCP sockets on the loopback interface.

use bytes::Bytes;
use futures::channel::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tcpip_forward::forward::{RemoteForwardRegistry, ReverseForwardEvent, FORWARDED_TCPIP};
use tcpip_forward::transport::{memory, ConnContext, NewChannel, Reply, Request};
use tcpip_forward::wire::{
    RemoteForwardCancelRequest, RemoteForwardChannelData, RemoteForwardRequest, RemoteForwardSuccess,
    WireDecode, WireEncode,
};
use tcpip_forward::ForwardOptions;

const CLIENT_ADDR: &str = "127.0.0.1:50022";

type EventLog = Arc<Mutex<Vec<ReverseForwardEvent>>>;

/// A registry serving requests for one in-memory connection
struct Harness {
    ctx: ConnContext,
    registry: RemoteForwardRegistry,
    requests: mpsc::UnboundedSender<Request>,
    peer: memory::MemoryPeer,
    events: EventLog,
}

impl Harness {
    fn start() -> Self {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        let options = ForwardOptions::new().with_reverse_policy(move |_: &ConnContext, event: &ReverseForwardEvent| {
            log.lock().unwrap().push(event.clone());
            true
        });

        let registry = RemoteForwardRegistry::new(options);
        let ctx = ConnContext::new(CLIENT_ADDR.parse().unwrap(), "127.0.0.1:22".parse().unwrap());
        let (conn, peer) = memory::pair(CLIENT_ADDR.parse().unwrap());
        let (tx, rx) = mpsc::unbounded();

        let serving = registry.clone();
        tokio::spawn({
            let ctx = ctx.clone();
            async move { serving.serve_requests(ctx, Arc::new(conn), rx).await }
        });

        Self {
            ctx,
            registry,
            requests: tx,
            peer,
            events,
        }
    }

    async fn request(&self, kind: &str, payload: Bytes) -> Reply {
        let (request, reply) = Request::with_reply(kind, payload);
        self.requests.unbounded_send(request).unwrap();
        timeout(Duration::from_secs(5), reply).await.unwrap().unwrap()
    }

    async fn forward(&self, host: &str, port: u16) -> u16 {
        let payload = RemoteForwardRequest {
            bind_addr: host.to_string(),
            bind_port: u32::from(port),
        }
        .encode();
        let reply = self.request("tcpip-forward", payload).await;
        assert!(reply.handled, "tcpip-forward was refused: {:?}", reply);
        let bound = RemoteForwardSuccess::decode(&reply.payload).unwrap().bound_port;
        u16::try_from(bound).unwrap()
    }

    async fn cancel(&self, host: &str, port: u16) -> Reply {
        let payload = RemoteForwardCancelRequest {
            bind_addr: host.to_string(),
            bind_port: u32::from(port),
        }
        .encode();
        self.request("cancel-tcpip-forward", payload).await
    }

    fn count(&self, signal: i8) -> usize {
        self.events.lock().unwrap().iter().filter(|event| event.signal() == signal).count()
    }
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting until {}", what));
}

#[tokio::test]
async fn test_forwarded_connection_round_trip() {
    let mut harness = Harness::start();
    let port = harness.forward("127.0.0.1", 0).await;
    assert_ne!(port, 0);

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let client_port = client.local_addr().unwrap().port();

    let new_channel = timeout(Duration::from_secs(5), harness.peer.next_channel())
        .await
        .unwrap()
        .expect("a forwarded-tcpip channel");
    assert_eq!(new_channel.channel_type(), FORWARDED_TCPIP);

    let data = RemoteForwardChannelData::decode(new_channel.extra_data()).unwrap();
    assert_eq!(data.dest_host, "127.0.0.1");
    assert_eq!(data.dest_port, u32::from(port));
    assert_eq!(data.origin_host, "127.0.0.1");
    assert_eq!(data.origin_port, u32::from(client_port));

    let (mut channel, _requests) = new_channel.accept().await.unwrap();

    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    channel.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    channel.write_all(b"pong").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    // closing the channel closes the accepted socket
    drop(channel);
    let n = timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);

    wait_until("the channel is reported closed", || harness.count(-2) == 1).await;
    assert_eq!(harness.count(2), 1);
}

#[tokio::test]
async fn test_cancel_closes_listener() {
    let harness = Harness::start();
    let port = harness.forward("127.0.0.1", 0).await;
    assert!(harness.registry.is_forwarding("127.0.0.1:0"));

    let reply = harness.cancel("127.0.0.1", 0).await;
    assert_eq!(reply, Reply::handled(Bytes::new()));

    wait_until("the entry is removed", || !harness.registry.is_forwarding("127.0.0.1:0")).await;
    wait_until("both Stopped events arrive", || harness.count(-1) == 2).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn test_concurrent_binds_are_isolated() {
    let harness = Harness::start();
    let first = free_port().await;
    let second = free_port().await;

    assert_eq!(harness.forward("127.0.0.1", first).await, first);
    assert_eq!(harness.forward("127.0.0.1", second).await, second);
    let mut keys = vec![format!("127.0.0.1:{}", first), format!("127.0.0.1:{}", second)];
    keys.sort();
    assert_eq!(harness.registry.active_forwards(), keys);

    harness.cancel("127.0.0.1", first).await;
    wait_until("the first forward is removed", || {
        !harness.registry.is_forwarding(&format!("127.0.0.1:{}", first))
    })
    .await;

    assert!(harness.registry.is_forwarding(&format!("127.0.0.1:{}", second)));
    assert!(TcpStream::connect(("127.0.0.1", second)).await.is_ok());
}

#[tokio::test]
async fn test_context_end_closes_every_listener() {
    let harness = Harness::start();
    let first = harness.forward("127.0.0.1", 0).await;
    let second = harness.forward("127.0.0.1", free_port().await).await;
    assert_eq!(harness.registry.active_forwards().len(), 2);

    harness.ctx.cancel();

    wait_until("every forward is removed", || harness.registry.active_forwards().is_empty()).await;
    wait_until("each listener reports Stopped", || harness.count(-1) == 2).await;
    assert!(TcpStream::connect(("127.0.0.1", first)).await.is_err());
    assert!(TcpStream::connect(("127.0.0.1", second)).await.is_err());
}

#[tokio::test]
async fn test_refused_channel_drops_connection() {
    let mut harness = Harness::start();
    let port = harness.forward("127.0.0.1", 0).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let new_channel = timeout(Duration::from_secs(5), harness.peer.next_channel())
        .await
        .unwrap()
        .unwrap();
    new_channel
        .reject(tcpip_forward::transport::RejectReason::ConnectFailed, "no thanks")
        .await
        .unwrap();

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap().unwrap_or(0);
    assert_eq!(n, 0);
    assert_eq!(harness.count(2), 0);
}

#[tokio::test]
async fn test_context_end_lets_live_sessions_finish() {
    let mut harness = Harness::start();
    let port = harness.forward("127.0.0.1", 0).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let new_channel = timeout(Duration::from_secs(5), harness.peer.next_channel())
        .await
        .unwrap()
        .unwrap();
    let (mut channel, _requests) = new_channel.accept().await.unwrap();
    wait_until("the channel is reported open", || harness.count(2) == 1).await;

    harness.ctx.cancel();
    // the listener stops accepting but the entry stays until the session ends
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    assert_eq!(harness.count(-1), 0);
    assert!(harness.registry.is_forwarding("127.0.0.1:0"));

    let mut buf = [0u8; 4];
    client.write_all(b"ping").await.unwrap();
    channel.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
    channel.write_all(b"pong").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    drop(channel);
    drop(client);
    wait_until("the listener reports Stopped", || harness.count(-1) == 1).await;
    assert!(!harness.registry.is_forwarding("127.0.0.1:0"));

    let signals: Vec<i8> = harness.events.lock().unwrap().iter().map(|event| event.signal()).collect();
    let closed = signals.iter().position(|&signal| signal == -2).unwrap();
    let stopped = signals.iter().position(|&signal| signal == -1).unwrap();
    assert!(closed < stopped, "events out of order: {:?}", signals);
}
