//! Draining of channel requests that carry no meaning for forwarding

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::debug;
use tokio::task::JoinHandle;

use super::{ConnContext, Reply, Request};

/// Refuse every request until the stream ends or the connection context is cancelled
pub async fn discard_requests<S>(ctx: ConnContext, mut requests: S)
where
    S: Stream<Item = Request> + Unpin,
{
    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            next = requests.next() => match next {
                Some(request) => {
                    debug!("Discarding {} request on forwarding channel", request.kind());
                    request.reply(Reply::not_handled(Bytes::new()));
                }
                None => break,
            },
        }
    }
}

/// Run [`discard_requests`] as a detached task
pub fn spawn_discard_requests<S>(ctx: &ConnContext, requests: S) -> JoinHandle<()>
where
    S: Stream<Item = Request> + Unpin + Send + 'static,
{
    tokio::spawn(discard_requests(ctx.clone(), requests))
}
