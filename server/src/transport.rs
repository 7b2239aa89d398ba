//! WebSocket and health endpoints.
//!
//! Each accepted socket gets a reader loop and a writer task. The reader
//! decodes text frames into [`ClientMessage`]s and forwards them to the
//! server loop, and the writer drains the connection's outbound queue. When
//! either side finishes the connection is reported closed exactly once.

use crate::network::ServerHandle;
use crate::session::ConnectionId;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use serde::Serialize;
use shared::{ClientMessage, PROTOCOL_VERSION};
use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    rooms: usize,
    connections: usize,
    version: &'static str,
}

pub fn router(handle: ServerHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(handle)
}

/// Serves the endpoints until the listener fails.
pub async fn serve(listener: TcpListener, handle: ServerHandle) -> Result<(), TransportError> {
    axum::serve(listener, router(handle)).await?;
    Ok(())
}

async fn health(State(handle): State<ServerHandle>) -> Response {
    match handle.stats().await {
        Some(stats) => Json(Health {
            status: "ok",
            rooms: stats.rooms,
            connections: stats.connections,
            version: PROTOCOL_VERSION,
        })
        .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(handle): State<ServerHandle>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

async fn handle_socket(socket: WebSocket, handle: ServerHandle) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (conn_id, mut outbound) = handle.open_connection();

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // A rejected connection has its queue dropped right after the error is
    // queued, which ends the writer and closes the socket here.
    tokio::select! {
        _ = read_loop(conn_id, ws_rx, &handle) => writer.abort(),
        _ = &mut writer => {}
    }

    handle.close_connection(conn_id);
    debug!("Socket for connection {} finished", conn_id);
}

async fn read_loop(conn_id: ConnectionId, mut ws_rx: SplitStream<WebSocket>, handle: &ServerHandle) {
    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Connection {} read error: {}", conn_id, e);
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                handle.heartbeat(conn_id);
                match ClientMessage::from_json(&text) {
                    Ok(message) => handle.message(conn_id, message),
                    Err(e) => warn!("Dropping frame from connection {}: {}", conn_id, e),
                }
            }
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => handle.heartbeat(conn_id),
            Message::Close(_) => break,
        }
    }
}
