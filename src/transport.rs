//! WebSocket transport: upgrade, framing, and the ping/idle timers.
//!
//! Each inbound text frame is exactly one wire line, handed straight to
//! the Coordinator. Outbound lines arrive over a bounded per-peer channel
//! that the Coordinator writes into; this task's only job is to drain it.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::session::PeerHandle;
use crate::AppState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::now_v7();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(state.config.outbox_capacity);
    let disconnect = CancellationToken::new();

    state
        .coordinator
        .on_open(session_id, PeerHandle::new(outbox_tx, disconnect.clone()));

    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    let idle_timeout = Duration::from_secs(state.config.idle_timeout_secs);

    let writer_token = disconnect.clone();
    let writer = tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_interval);
        ping_timer.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                // Drain whatever is already queued before noticing a
                // cancellation: a line enqueued (e.g. CONNECTION_RESPONSE
                // ROOM_FULL just before a forced disconnect) must reach the
                // socket, never lose a race against the cancel arm.
                biased;

                maybe_line = outbox_rx.recv() => {
                    match maybe_line {
                        Some(line) => {
                            if ws_sender.send(Message::Text(line.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_timer.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                _ = writer_token.cancelled() => break,
            }
        }

        // The cancellation arm above can still win a poll while lines are
        // queued behind it; flush them before closing the sink so a
        // synchronous reply (e.g. ROOM_FULL) is never dropped on the floor.
        while let Ok(line) = outbox_rx.try_recv() {
            if ws_sender.send(Message::Text(line.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut idle_deadline = Instant::now() + idle_timeout;
    loop {
        tokio::select! {
            () = disconnect.cancelled() => break,
            () = tokio::time::sleep_until(idle_deadline) => {
                tracing::debug!(%session_id, "idle timeout, closing connection");
                break;
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline = Instant::now() + idle_timeout;
                        state.coordinator.on_message(session_id, &text);
                    }
                    Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {
                        idle_deadline = Instant::now() + idle_timeout;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(error)) => {
                        tracing::debug!(%session_id, %error, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    disconnect.cancel();
    writer.abort();
    state.coordinator.on_close(session_id);
}
