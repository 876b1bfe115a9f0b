//! Per-connection task.
//!
//! One task owns each WebSocket. It registers the connection under the
//! identity bound at handshake, feeds inbound text frames to the relay in
//! arrival order, and drains the connection's outbound queue onto the socket.
//! On exit it removes the registry entry only if this connection still owns
//! it.

mod messaging;
mod routing;

pub use messaging::RelayEngine;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use tokio::sync::mpsc;

use crate::protocol::error_frame;
use crate::registry::ConnectionHandle;
use crate::server::SharedState;

/// Close code for a socket that reached the open state without an identity.
pub const UNAUTHENTICATED_CLOSE: u16 = 1003;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

fn unauthenticated_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: UNAUTHENTICATED_CLOSE,
        reason: "Unauthenticated".into(),
    }))
}

pub async fn handle_socket(mut socket: WebSocket, identity: String, state: Arc<SharedState>) {
    if identity.trim().is_empty() {
        tracing::warn!("WebSocket opened without an identity, closing");
        let _ = socket.send(unauthenticated_close()).await;
        return;
    }

    let (tx, mut rx) = mpsc::channel(state.config.outbound_buffer.max(1));
    let handle = ConnectionHandle::new(identity.clone(), tx);
    let conn_id = handle.id();
    match state.registry.register(handle.clone()) {
        Some(prev) => tracing::info!(%identity, conn_id, superseded = prev.id(), "Connection open, replacing earlier one"),
        None => tracing::info!(%identity, conn_id, "Connection open"),
    }

    loop {
        tokio::select! {
            biased;

            out = rx.recv() => {
                let Some(frame) = out else { break };
                match tokio::time::timeout(SEND_TIMEOUT, socket.send(WsMessage::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => {
                        tracing::debug!(%identity, conn_id, "WebSocket send failed or timed out");
                        break;
                    }
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => state.relay.process_frame(&handle, text.as_str()),
                    Some(Ok(WsMessage::Binary(_))) => {
                        let _ = handle.send_text(error_frame("binary frames are not supported"));
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(%identity, conn_id, "WebSocket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    if state.registry.unregister(&identity, &handle) {
        tracing::info!(%identity, conn_id, "Connection closed");
    } else {
        tracing::info!(%identity, conn_id, "Superseded connection closed");
    }
}
