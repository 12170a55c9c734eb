//! WebSocket transport for the real-time channel
//!
//! One task per connection reads frames and feeds them to the engine strictly in
//! arrival order. A second task drains the connection's bounded outbound queue
//! into the socket. Either side ending closes the session.

use crate::chat::registry::ConnectionHandle;
use crate::core::config::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handle, mut outbound) = ConnectionHandle::channel(state.config.outbound_buffer);
    let conn = handle.id();
    info!(%conn, "Connection opened");

    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(%conn, "Failed to encode outbound event: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                debug!(%conn, "Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.engine.handle_frame(&handle, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(%conn, "Received binary WebSocket message (not supported)");
                }
                // Pings are answered by the transport
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%conn, "WebSocket error: {}", e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.engine.disconnected(conn).await;
    writer.abort();
    info!(%conn, "Connection closed");
}
