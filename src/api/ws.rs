// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket transport.
//!
//! Each socket gets a [`ConnId`] and two tasks. The reader parses frames
//! into [`ClientMessage`]s and forwards them to the enclave inbox. The writer
//! serializes whatever the enclave queues for the connection and closes the
//! socket after a `disconnect`. No game logic runs here.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::enclave::{EnclaveHandle, Inbound};
use crate::protocol::{ClientMessage, ConnId, ServerMessage};
use crate::state::AppState;

/// Upgrade to the game protocol.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "Game",
    responses(
        (status = 101, description = "Switching to the JSON game protocol")
    )
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.enclave))
}

async fn handle_socket(socket: WebSocket, enclave: EnclaveHandle) {
    let conn = ConnId::new();
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    if !enclave.send(Inbound::Connected { conn, outbound }) {
        tracing::warn!(conn = %conn, "Enclave stopped, refusing connection");
        return;
    }
    tracing::debug!(conn = %conn, "WebSocket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = message.closes_connection();
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(conn = %conn, error = %e, "Failed to serialize message"),
            }
            if closing {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    let reader_enclave = enclave.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            let inbound = match frame {
                Message::Text(text) => parse_frame(conn, text.as_str()),
                Message::Binary(_) => Inbound::Malformed {
                    conn,
                    error: "binary frames are not supported".to_string(),
                },
                Message::Close(_) => break,
                _ => continue,
            };
            if !reader_enclave.send(inbound) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    enclave.send(Inbound::Disconnected { conn });
    tracing::debug!(conn = %conn, "WebSocket closed");
}

/// Turn one text frame into an inbox entry.
pub fn parse_frame(conn: ConnId, text: &str) -> Inbound {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => Inbound::Message { conn, message },
        Err(e) => Inbound::Malformed {
            conn,
            error: format!("invalid frame: {e}"),
        },
    }
}
