//! Host-only lobby configuration: difficulty, category and settings.
//!
//! All three are rejected outside the lobby; the dispatch layer treats that
//! rejection as a benign race and stays silent, matching the cooperative
//! trust model.

use super::{AppState, RoomError, RoomResult};
use crate::types::*;

impl AppState {
    pub async fn set_difficulty(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        difficulty: Difficulty,
    ) -> RoomResult<()> {
        let view = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Lobby {
                return Err(RoomError::InvalidState);
            }
            if !room.is_host(conn_id) {
                return Err(RoomError::NotHost("cambiar la dificultad"));
            }
            room.difficulty = difficulty;
            RoomView::from(&*room)
        };
        self.broadcast_update(code, view).await;
        Ok(())
    }

    pub async fn set_category(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        category: Option<String>,
    ) -> RoomResult<()> {
        let view = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Lobby {
                return Err(RoomError::InvalidState);
            }
            if !room.is_host(conn_id) {
                return Err(RoomError::NotHost("cambiar la categoría"));
            }
            room.category = category;
            RoomView::from(&*room)
        };
        self.broadcast_update(code, view).await;
        Ok(())
    }

    /// Merge a partial settings update into the room's settings.
    pub async fn update_settings(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        patch: SettingsPatch,
    ) -> RoomResult<()> {
        let view = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Lobby {
                return Err(RoomError::InvalidState);
            }
            if !room.is_host(conn_id) {
                return Err(RoomError::NotHost("cambiar los ajustes"));
            }
            room.settings.merge(patch);
            RoomView::from(&*room)
        };
        self.broadcast_update(code, view).await;
        Ok(())
    }
}
