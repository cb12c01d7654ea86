//! WebSocket Connection Handler
//!
//! Bridges one upgraded WebSocket to a [`ConnectionSession`]: text frames
//! become inbound actions, outbound status updates become JSON text frames.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::messages::{Inbound, Outbound};
use super::session::ConnectionSession;
use crate::startup::AppState;

/// Time allowed for the writer to flush the final frames
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler for `/on-queue` and `/reconnect`
pub async fn queue_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_failed_upgrade(|e| tracing::debug!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Split socket for concurrent read/write
    let (mut sender, receiver) = socket.split();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let session = ConnectionSession::new(state.session_context(), tx);
    let client_id = session.client_id().to_string();
    tracing::debug!(client_id = %client_id, "New WebSocket connection");

    // Forward messages from channel to WebSocket
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                Outbound::Status(status) => {
                    let text = match serde_json::to_string(&status) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!("Failed to serialize status: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let inbound = receiver
        .take_while(|frame| future::ready(matches!(frame, Ok(msg) if !matches!(msg, Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Inbound::from_text(text.as_str())),
                // Ping/pong are answered by axum; binary frames are not part of the protocol
                _ => None,
            })
        });

    let reason = session.run(Box::pin(inbound)).await;

    if timeout(WRITER_DRAIN_TIMEOUT, sender_task).await.is_err() {
        tracing::debug!(client_id = %client_id, "Writer did not drain in time");
    }

    tracing::debug!(client_id = %client_id, reason = reason.as_str(), "WebSocket disconnected");
}
