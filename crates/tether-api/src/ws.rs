//! WebSocket peer endpoint.
//!
//! Each connection gets a bounded outbound queue drained by a writer task.
//! The registry holds the only sender, so bridge fan-out never touches the
//! socket directly, and a peer the registry drops (closed or full queue)
//! loses its writer and is disconnected. Inbound frames go through
//! [`dispatch_inbound`]; its replies are routed back through the registry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tether_wire::{dispatch_inbound, Dispatch, PeerId, SendOutcome};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::routes::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Optional session id the peer wants to be addressable by.
    pub session_id: Option<String>,
}

/// `GET /ws`: upgrade to a peer connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
) -> Response {
    let max = state.kernel.config.peers.max_message_size;
    let session_id = query.session_id.filter(|s| !s.is_empty());
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state, addr, session_id))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    addr: SocketAddr,
    session_id: Option<String>,
) {
    let kernel = &state.kernel;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(kernel.config.peers.outbound_queue);

    let peer_id = kernel
        .registry
        .register(session_id, Some(addr), Arc::new(tx));

    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(peer_id, "Peer writer finished");
                break;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(peer_id, text.as_str(), &state).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(peer_id, bytes = data.len(), "Binary frame ignored");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the transport.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(peer_id, error = %e, "Peer socket error");
                        break;
                    }
                }
            }
        }
    }

    kernel.registry.deregister(peer_id);
    writer.abort();
}

/// Returns false once the peer is no longer registered.
async fn handle_text(peer_id: PeerId, text: &str, state: &AppState) -> bool {
    let kernel = &state.kernel;
    let Dispatch::Reply(reply) = dispatch_inbound(text, peer_id, &kernel.bridge) else {
        return true;
    };
    match kernel.registry.send_to(peer_id, &reply).await {
        Ok(SendOutcome::Delivered) => true,
        Ok(_) => false,
        Err(e) => {
            warn!(peer_id, error = %e, "Failed to encode reply");
            true
        }
    }
}
