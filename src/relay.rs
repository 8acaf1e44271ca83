//! Data relay module
//!
//! This module copies bytes in both directions between two duplex streams.
//! Whichever direction stops first, through end of stream or an I/O error,
//! closes both streams. Read and write failures are how a peer disconnect
//! shows up, so they end the session quietly instead of being reported.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default relay buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Byte counts of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the first stream to the second
    pub a_to_b: u64,
    /// Bytes copied from the second stream to the first
    pub b_to_a: u64,
}

/// Handle to a running relay
///
/// Dropping the handle detaches the relay; it keeps running until one side
/// closes.
#[derive(Debug)]
pub struct Relay {
    a_to_b: JoinHandle<u64>,
    b_to_a: JoinHandle<u64>,
}

impl Relay {
    /// Wait until both directions have stopped
    pub async fn wait(self) -> RelayStats {
        let a_to_b = self.a_to_b.await.unwrap_or(0);
        let b_to_a = self.b_to_a.await.unwrap_or(0);
        RelayStats { a_to_b, b_to_a }
    }
}

/// Start relaying between `a` and `b`
///
/// # Parameters
///
/// * `a` - First stream, typically a transport channel
/// * `b` - Second stream, typically a TCP socket
/// * `buffer_size` - Size of the copy buffer used by each direction
///
/// # Returns
///
/// A [`Relay`] handle that can be awaited or dropped.
pub fn relay<A, B>(a: A, b: B, buffer_size: usize) -> Relay
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_reader, a_writer) = tokio::io::split(a);
    let (b_reader, b_writer) = tokio::io::split(b);
    let closed = CancellationToken::new();

    let a_to_b = tokio::spawn(copy_direction(a_reader, b_writer, closed.clone(), buffer_size, "a->b"));
    let b_to_a = tokio::spawn(copy_direction(b_reader, a_writer, closed, buffer_size, "b->a"));

    Relay { a_to_b, b_to_a }
}

async fn copy_direction<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    closed: CancellationToken,
    buffer_size: usize,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total_bytes = 0u64;

    loop {
        let n = tokio::select! {
            _ = closed.cancelled() => break,
            read = reader.read(&mut buffer) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            },
        };

        let written = tokio::select! {
            _ = closed.cancelled() => break,
            written = writer.write_all(&buffer[..n]) => written,
        };
        if written.is_err() {
            break;
        }
        total_bytes += n as u64;
    }

    // Stop the opposite direction too; each stream is released once both of
    // its halves are dropped.
    closed.cancel();
    let _ = writer.shutdown().await;

    debug!("Relay {} transferred {} bytes total", direction, total_bytes);
    total_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        let (a_inner, mut a_outer) = duplex(1024);
        let (b_inner, mut b_outer) = duplex(1024);
        let session = relay(a_inner, b_inner, 16);

        a_outer.write_all(b"hello from a, longer than one buffer").await.unwrap();
        let mut buf = vec![0u8; 36];
        b_outer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello from a, longer than one buffer");

        b_outer.write_all(b"reply").await.unwrap();
        let mut buf = [0u8; 5];
        a_outer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reply");

        drop(a_outer);
        let stats = timeout(Duration::from_secs(1), session.wait()).await.unwrap();
        assert_eq!(stats, RelayStats { a_to_b: 36, b_to_a: 5 });
    }

    #[tokio::test]
    async fn test_one_side_closing_closes_the_other() {
        let (a_inner, a_outer) = duplex(64);
        let (b_inner, mut b_outer) = duplex(64);
        let session = relay(a_inner, b_inner, DEFAULT_BUFFER_SIZE);

        drop(a_outer);

        // b sees end of stream even though it never wrote anything
        let mut buf = Vec::new();
        let n = timeout(Duration::from_secs(1), b_outer.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        timeout(Duration::from_secs(1), session.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_detached_relay_keeps_running() {
        let (a_inner, mut a_outer) = duplex(64);
        let (b_inner, mut b_outer) = duplex(64);
        drop(relay(a_inner, b_inner, DEFAULT_BUFFER_SIZE));

        a_outer.write_all(b"still here").await.unwrap();
        let mut buf = [0u8; 10];
        b_outer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still here");
    }
}
