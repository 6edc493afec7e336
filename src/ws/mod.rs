pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
///
/// Each connection gets a fresh id and a direct delivery channel; a room
/// broadcast subscription is attached once the client creates or joins a
/// room. Durable identity lives in the client-supplied userId, never here.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ulid::Ulid::new().to_string();
    let (mut sender, mut receiver) = socket.split();

    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.register_connection(&conn_id, direct_tx).await;

    tracing::info!("WebSocket connected: {}", conn_id);

    let mut room_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            // Direct messages (acks, errors, host notifications)
            direct_msg = direct_rx.recv() => {
                match direct_msg {
                    Some(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Room-wide broadcasts, once subscribed
            room_msg = async {
                match &mut room_rx {
                    Some(rx) => Some(rx.recv().await),
                    None => {
                        // Not in a room: wait forever
                        std::future::pending().await
                    }
                }
            } => {
                match room_msg {
                    Some(Ok(msg)) => {
                        let closed = matches!(msg, ServerMessage::RoomClosed);
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                        if closed {
                            room_rx = None;
                        }
                    }
                    Some(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                        // The next room_update carries full state anyway
                        tracing::warn!("Connection {} lagged, skipped {}", conn_id, skipped);
                    }
                    Some(Err(broadcast::error::RecvError::Closed)) | None => {
                        room_rx = None;
                    }
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let dispatch =
                                    handlers::handle_message(client_msg, &conn_id, &state).await;

                                // Subscribe before the snapshot broadcast so
                                // this connection receives it too
                                let joined = dispatch.joined_room;
                                if let Some(code) = &joined {
                                    room_rx = state.subscribe(code).await;
                                }
                                if let Some(reply) = dispatch.reply {
                                    if send_json(&mut sender, &reply).await.is_err() {
                                        break;
                                    }
                                }
                                if let Some(code) = &joined {
                                    state.rebroadcast(code).await;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if send_json(&mut sender, &error).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed: {}", conn_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error on {}: {}", conn_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister_connection(&conn_id).await;
    state.handle_disconnect(&conn_id).await;
    tracing::info!("WebSocket connection closed: {}", conn_id);
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}
