//! Per-connection ingress loop.
//!
//! One task per WebSocket. Three futures share it under `select!`:
//!
//! - the reader feeds inbound frames to the [`EventRouter`];
//! - the writer drains the connection's outbound queue into the socket;
//! - the heartbeat queues a ping on a fixed interval.
//!
//! Whichever finishes first (client close, read error, write error, failed
//! heartbeat, or a broadcast closing the handle) ends the connection; the
//! others are dropped with it and the registration guard deregisters it.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::handle::{ConnectionHandle, Outbound};
use super::heartbeat::run_heartbeat;
use crate::app_state::AppState;
use crate::domain::ConnectionId;
use crate::service::EventRouter;

/// Runs one WebSocket connection to completion.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (handle, outbound_rx) = ConnectionHandle::new(state.session.outbound_buffer);
    let handle = Arc::new(handle);
    let conn_id = handle.id();
    let _registration = state.registry.register(Arc::clone(&handle));

    tracing::info!(%conn_id, connections = state.registry.len(), "websocket client connected");

    let (ws_tx, ws_rx) = socket.split();

    tokio::select! {
        () = read_loop(ws_rx, &state.router, conn_id) => {}
        () = write_loop(ws_tx, outbound_rx, conn_id) => {}
        () = run_heartbeat(&handle, state.session.heartbeat_interval) => {}
        () = handle.closed() => {
            tracing::debug!(%conn_id, "connection closed by server");
        }
    }

    handle.close();
    tracing::info!(%conn_id, "websocket client disconnected");
}

async fn read_loop(mut ws_rx: SplitStream<WebSocket>, router: &EventRouter, conn_id: ConnectionId) {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                tracing::debug!(%conn_id, message = %text.as_str(), "received message");
                router.route(text.as_str().as_bytes()).await;
            }
            Ok(Message::Binary(bytes)) => {
                router.route(&bytes).await;
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!(%conn_id, ?frame, "client sent close");
                return;
            }
            // Pong replies and client pings are handled by the protocol layer.
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to read websocket message");
                return;
            }
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    conn_id: ConnectionId,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let message = match frame {
            Outbound::Text(text) => Message::text(&*text),
            Outbound::Ping => Message::Ping(Default::default()),
        };
        if let Err(e) = ws_tx.send(message).await {
            tracing::warn!(%conn_id, error = %e, "failed to write websocket message");
            return;
        }
    }
}
