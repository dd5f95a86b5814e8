use std::fmt::Display;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, FrameMetrics};
use crate::relay::RelayCoordinator;
use crate::server::AppState;

use super::message::OutboundMessage;

/// WebSocket upgrade handler. No authentication: identity arrives in the
/// client's first `identify` frame.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();

    // Outbound queue for this connection; unbounded so broadcasts never block
    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();

    let handle = state.relay.connect(tx).await;
    let connection_id = handle.id;
    ConnectionMetrics::record_opened();

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let (ws_sender, ws_receiver) = socket.split();
    run_connection(state.relay.clone(), handle, rx, ws_sender, ws_receiver).await;

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Pump the outbound queue into the socket and inbound frames into the relay
/// until either side ends, then run the close path exactly once.
///
/// The surviving task is aborted and awaited before `disconnect`, so a peer
/// that never answers (an idle-reaped client) does not keep the read half
/// alive.
pub(crate) async fn run_connection<Tx, Rx, E>(
    relay: Arc<RelayCoordinator>,
    handle: Arc<ConnectionHandle>,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut ws_sender: Tx,
    mut ws_receiver: Rx,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let connection_id = handle.id;

    // Task for sending messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Ping => Message::Ping(Bytes::new()),
                OutboundMessage::Close => {
                    let _ = ws_sender.close().await;
                    break;
                }
                other => match other.to_json() {
                    Some(Ok(text)) => Message::Text(text.into()),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Failed to serialize message");
                        continue;
                    }
                    None => continue,
                },
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving messages from WebSocket
    let recv_relay = relay.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_relay, &recv_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
            let _ = send_task.await;
        }
    }

    // Transport errors, clean closes and idle reaping take the same path
    relay.disconnect(connection_id).await;
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, relay: &RelayCoordinator, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();
            let outcome = relay.handle_frame(handle.id, text.as_str()).await;
            tracing::trace!(connection_id = %handle.id, outcome = ?outcome, "Frame handled");
            true
        }
        Message::Binary(_) => {
            // Nothing is ever written back on the same channel
            handle.update_activity();
            tracing::warn!(connection_id = %handle.id, "Dropping binary frame");
            FrameMetrics::record_unsupported();
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings automatically
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
