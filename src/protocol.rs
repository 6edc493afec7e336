use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        name: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
        user_id: UserId,
    },
    JoinRoom {
        name: String,
        code: RoomCode,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
        user_id: UserId,
    },
    SetDifficulty {
        code: RoomCode,
        difficulty: Difficulty,
    },
    /// `category: null` selects the mix of all categories.
    SetCategory {
        code: RoomCode,
        category: Option<String>,
    },
    UpdateSettings {
        code: RoomCode,
        settings: SettingsPatch,
    },
    StartGame {
        code: RoomCode,
    },
    SubmitTerm {
        code: RoomCode,
        term: String,
    },
    Vote {
        code: RoomCode,
        target: VoteTarget,
    },
    /// Non-binding ballot from an eliminated player.
    GhostVote {
        code: RoomCode,
        target: ConnectionId,
    },
    /// Fire-and-forget cosmetic reaction, nothing stored.
    GhostAction {
        code: RoomCode,
        emoji: String,
    },
    RestartGame {
        code: RoomCode,
    },
    LeaveRoom {
        code: RoomCode,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated {
        code: RoomCode,
    },
    JoinAck {
        code: RoomCode,
    },
    /// Sanitized snapshot, broadcast to the room after every mutation.
    RoomUpdate {
        room: RoomView,
    },
    /// Same snapshot as `room_update`, but signals the dedicated client
    /// transition at game start.
    GameStarted {
        room: RoomView,
    },
    RoomClosed,
    /// Host-only notification.
    PlayerDisconnected {
        player_name: String,
        active_players: usize,
    },
    /// Ephemeral, never stored.
    GhostReaction {
        emoji: String,
        from_id: ConnectionId,
    },
    Error {
        code: String,
        msg: String,
    },
}
