//! WebSocket message dispatch
//!
//! Every client command is routed here. Authorization and state checks live
//! in the state layer; this module only decides which failures are worth a
//! reply. Races inherent to a realtime game (a vote landing after the tally,
//! a submission after the phase flipped) are swallowed, while mistakes the
//! user can act on (wrong code, not the host, too few players) are surfaced.

use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RoomError};
use crate::types::RoomCode;

/// Outcome of dispatching one client message.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Direct reply for the sending connection.
    pub reply: Option<ServerMessage>,
    /// Set when the connection entered a room and should subscribe to its
    /// broadcast channel.
    pub joined_room: Option<RoomCode>,
}

fn error_reply(err: RoomError) -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: err.code().to_string(),
        msg: err.to_string(),
    })
}

/// Surface only the errors the sender can do something about.
fn surface(err: RoomError, wanted: &[&'static str]) -> Option<ServerMessage> {
    if wanted.contains(&err.code()) {
        error_reply(err)
    } else {
        None
    }
}

pub async fn handle_message(
    msg: ClientMessage,
    conn_id: &str,
    state: &Arc<AppState>,
) -> Dispatch {
    let conn_id = conn_id.to_string();
    match msg {
        ClientMessage::CreateRoom {
            name,
            color,
            avatar,
            user_id,
        } => {
            let code = state
                .create_room(&conn_id, name, color, avatar, user_id)
                .await;
            Dispatch {
                reply: Some(ServerMessage::RoomCreated { code: code.clone() }),
                joined_room: Some(code),
            }
        }

        ClientMessage::JoinRoom {
            name,
            code,
            color,
            avatar,
            user_id,
        } => match state
            .join_room(&conn_id, &code, name, color, avatar, user_id)
            .await
        {
            Ok(()) => Dispatch {
                reply: Some(ServerMessage::JoinAck { code: code.clone() }),
                joined_room: Some(code),
            },
            Err(err) => Dispatch {
                reply: error_reply(err),
                ..Default::default()
            },
        },

        ClientMessage::SetDifficulty { code, difficulty } => {
            let reply = state
                .set_difficulty(&conn_id, &code, difficulty)
                .await
                .err()
                .and_then(|e| surface(e, &["UNAUTHORIZED"]));
            Dispatch {
                reply,
                ..Default::default()
            }
        }

        ClientMessage::SetCategory { code, category } => {
            let reply = state
                .set_category(&conn_id, &code, category)
                .await
                .err()
                .and_then(|e| surface(e, &["UNAUTHORIZED"]));
            Dispatch {
                reply,
                ..Default::default()
            }
        }

        ClientMessage::UpdateSettings { code, settings } => {
            let reply = state
                .update_settings(&conn_id, &code, settings)
                .await
                .err()
                .and_then(|e| surface(e, &["UNAUTHORIZED"]));
            Dispatch {
                reply,
                ..Default::default()
            }
        }

        ClientMessage::StartGame { code } => {
            let reply = state
                .start_game(&conn_id, &code)
                .await
                .err()
                .and_then(|e| surface(e, &["UNAUTHORIZED", "NOT_ENOUGH_PLAYERS"]));
            Dispatch {
                reply,
                ..Default::default()
            }
        }

        ClientMessage::SubmitTerm { code, term } => {
            // Late submissions lose the race with the phase change; no reply
            let _ = state.submit_term(&conn_id, &code, term).await;
            Dispatch::default()
        }

        ClientMessage::Vote { code, target } => {
            let _ = state.vote(&conn_id, &code, target).await;
            Dispatch::default()
        }

        ClientMessage::GhostVote { code, target } => {
            let _ = state.ghost_vote(&conn_id, &code, target).await;
            Dispatch::default()
        }

        ClientMessage::GhostAction { code, emoji } => {
            let _ = state.ghost_action(&conn_id, &code, emoji).await;
            Dispatch::default()
        }

        ClientMessage::RestartGame { code } => {
            let reply = state
                .restart_game(&conn_id, &code)
                .await
                .err()
                .and_then(|e| surface(e, &["UNAUTHORIZED"]));
            Dispatch {
                reply,
                ..Default::default()
            }
        }

        ClientMessage::LeaveRoom { code } => {
            state.leave_room(&conn_id, &code).await;
            Dispatch::default()
        }
    }
}
