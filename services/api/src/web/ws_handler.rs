//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point for a WebSocket connection. It bridges the socket
//! to the session loop: incoming text frames become client messages, and
//! everything the session emits is written back as JSON text frames.

use crate::error::ApiError;
use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    session::run_session,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    info!(%session_id, "New WebSocket connection established");

    let (sender, mut receiver) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientMessage>(32);
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMessage>(32);
    let cancel = CancellationToken::new();

    // --- 1. Writer: session output to the socket ---
    let writer = tokio::spawn(write_messages(sender, outbound_rx, cancel.clone()));

    // --- 2. Session loop ---
    let session = tokio::spawn(run_session(
        session_id,
        app_state.actions.clone(),
        inbound_rx,
        outbound_tx.clone(),
        cancel.clone(),
    ));

    // --- 3. Reader: socket frames to the session ---
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = receiver.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%session_id, "Failed to deserialize client message: {}", e);
                    let reply = ServerMessage::Error {
                        message: format!("Unrecognized message: {e}"),
                    };
                    if outbound_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Some(Ok(Message::Close(_))) => {
                info!(%session_id, "Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(%session_id, "WebSocket receive error: {}", e);
                break;
            }
            None => {
                info!(%session_id, "Client disconnected.");
                break;
            }
        }
    }

    // --- 4. Cleanup: stop every task belonging to this connection ---
    cancel.cancel();
    drop(inbound_tx);
    if let Err(e) = session.await {
        error!(%session_id, "Session task failed: {}", e);
    }
    match writer.await {
        Ok(Err(e)) => warn!(%session_id, "Writer stopped with an error: {}", e),
        Err(e) => error!(%session_id, "Writer task failed: {}", e),
        Ok(Ok(())) => {}
    }
    info!(%session_id, "WebSocket connection closed.");
}

async fn write_messages(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
) -> Result<(), ApiError> {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let json = serde_json::to_string(&message)?;
        if let Err(e) = sender.send(Message::Text(json.into())).await {
            cancel.cancel();
            return Err(e.into());
        }
    }
    let _ = sender.close().await;
    Ok(())
}
