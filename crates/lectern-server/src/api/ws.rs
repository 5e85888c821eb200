//! WebSocket endpoint feeding the notification fabric.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::notify::PEER_QUEUE_DEPTH;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/:job_id", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path(job_id): Path<Uuid>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state, addr.ip(), job_id))
}

async fn client_session(socket: WebSocket, state: AppState, ip: IpAddr, job: Uuid) {
    let (mut sink, mut inbound) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(PEER_QUEUE_DEPTH);
    let token = state.hub.register(ip, job, tx).await;
    debug!(%ip, %job, "websocket session opened");

    // Writer drains the hub's queue; it ends when the handle is dropped,
    // either on deregistration or when a newer connection replaces this one.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // The socket is push-only; inbound frames are drained until the peer
    // closes or errors, both of which end the session.
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    state.hub.deregister(ip, token).await;
    let _ = writer.await;
    debug!(%ip, %job, "websocket session closed");
}
