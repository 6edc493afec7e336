//! Room creation, lookup and teardown.

use std::collections::HashMap;

use rand::Rng;

use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;

const CODE_LEN: usize = 4;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub(crate) const DEFAULT_COLOR: &str = "#6d28d9";
pub(crate) const DEFAULT_AVATAR: &str = "👤";

fn generate_code(existing: &HashMap<RoomCode, Room>) -> RoomCode {
    let mut rng = rand::rng();
    loop {
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
            .collect();
        // Collision is unlikely at this scale, but retrying is cheap
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

impl AppState {
    /// Create a room with the caller as host and return its code.
    pub async fn create_room(
        &self,
        conn_id: &ConnectionId,
        name: String,
        color: Option<String>,
        avatar: Option<String>,
        user_id: UserId,
    ) -> RoomCode {
        let code = {
            let mut rooms = self.rooms.write().await;
            let code = generate_code(&rooms);
            let mut room = Room::new(code.clone());
            room.players.push(Player {
                id: conn_id.clone(),
                user_id,
                name,
                is_host: true,
                color: color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
                avatar: avatar.unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
                disconnected: false,
                disconnected_at: None,
            });
            rooms.insert(code.clone(), room);
            code
        };

        self.insert_channel(&code).await;
        tracing::info!("Room {} created", code);
        code
    }

    /// Tear a room down: notify members, cancel its timers, drop all state.
    pub async fn delete_room(&self, code: &str) {
        self.rooms.write().await.remove(code);
        self.timers.cancel_all(code).await;
        self.broadcast_room(code, ServerMessage::RoomClosed).await;
        self.remove_channel(code).await;
        tracing::info!("Room {} deleted", code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_room_sets_up_host() {
        let state = AppState::new();
        let code = state
            .create_room(
                &"conn-0".to_string(),
                "Ana".to_string(),
                None,
                None,
                "user-0".to_string(),
            )
            .await;

        assert_eq!(code.len(), 4);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Lobby);
        assert_eq!(view.players.len(), 1);
        assert!(view.players[0].is_host);
        assert_eq!(view.players[0].color, DEFAULT_COLOR);
    }

    #[tokio::test]
    async fn test_codes_are_unique_per_call() {
        let state = AppState::new();
        let mut codes = std::collections::HashSet::new();
        for i in 0..20 {
            let code = state
                .create_room(
                    &format!("conn-{i}"),
                    "Ana".to_string(),
                    None,
                    None,
                    format!("user-{i}"),
                )
                .await;
            assert!(codes.insert(code));
        }
    }

    #[tokio::test]
    async fn test_delete_room_notifies_and_removes() {
        let state = AppState::new();
        let code = state
            .create_room(
                &"conn-0".to_string(),
                "Ana".to_string(),
                None,
                None,
                "user-0".to_string(),
            )
            .await;
        let mut rx = state.subscribe(&code).await.unwrap();

        state.delete_room(&code).await;

        assert!(state.snapshot(&code).await.is_none());
        assert!(state.subscribe(&code).await.is_none());
        assert!(matches!(rx.recv().await, Ok(ServerMessage::RoomClosed)));
    }
}
