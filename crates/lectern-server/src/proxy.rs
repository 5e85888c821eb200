//! Streaming proxy: relays an upstream chunked byte stream to the client
//! without buffering the payload.
//!
//! A bounded channel sits between the upstream-reader task and the response
//! body. The reader blocks on `send` when the client is slow, so it never
//! pulls upstream chunks faster than they are consumed; when the client
//! disconnects the channel closes and dropping the upstream stream aborts
//! the fetch. An upstream error mid-stream is injected into the body so the
//! connection terminates abruptly instead of looking complete.

use std::io;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

/// In-flight chunks between upstream and downstream.
pub const RELAY_BUFFER_CHUNKS: usize = 8;

pub fn relay(upstream: reqwest::Response, content_type: &'static str) -> Response {
    let chunks = upstream
        .bytes_stream()
        .map(|item| item.map_err(io::Error::other));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(relay_body(chunks))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

pub(crate) fn relay_body<S>(upstream: S) -> Body
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(RELAY_BUFFER_CHUNKS);
    tokio::spawn(pump(upstream, tx));
    Body::from_stream(ReceiverStream::new(rx))
}

async fn pump<S>(upstream: S, tx: mpsc::Sender<Result<Bytes, io::Error>>)
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    futures::pin_mut!(upstream);
    while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    debug!("client disconnected, aborting upstream relay");
                    return;
                }
            }
            Err(err) => {
                error!("upstream stream failed mid-relay: {err}");
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}
