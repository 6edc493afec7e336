mod connection;
mod game;
mod lobby;
mod registry;
mod vote;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::config::ServerConfig;
use crate::protocol::ServerMessage;
use crate::timers::TimerTable;
use crate::types::*;
use crate::words::{BuiltinDictionary, WordSource};

pub type RoomResult<T> = Result<T, RoomError>;

/// Room-operation failures. Only some of these are surfaced to clients;
/// state races (e.g. a vote arriving after voting closed) are treated as
/// benign and swallowed at the dispatch layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Sala no encontrada")]
    RoomNotFound,
    #[error("Partida ya empezada")]
    GameInProgress,
    #[error("Se necesitan al menos 3 jugadores")]
    NotEnoughPlayers,
    #[error("Solo el anfitrión puede {0}")]
    NotHost(&'static str),
    #[error("Acción no permitida en el estado actual")]
    InvalidState,
    #[error("No estás en esta sala")]
    NotInRoom,
}

impl RoomError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::GameInProgress => "GAME_IN_PROGRESS",
            Self::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            Self::NotHost(_) => "UNAUTHORIZED",
            Self::InvalidState => "INVALID_STATE",
            Self::NotInRoom => "NOT_IN_ROOM",
        }
    }
}

/// Shared application state
///
/// All room mutation happens under the `rooms` write lock and runs to
/// completion before the next event, so handlers never observe a half-applied
/// transition. Broadcasting always happens after the lock is released.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomCode, Room>>>,
    /// Per-room fan-out channel for snapshots and room-wide events.
    channels: Arc<RwLock<HashMap<RoomCode, broadcast::Sender<ServerMessage>>>>,
    /// Direct per-connection delivery, for acks and host-only notifications.
    connections: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>,
    pub timers: TimerTable,
    pub words: Arc<dyn WordSource>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self::new_with(Arc::new(BuiltinDictionary), ServerConfig::default())
    }

    pub fn new_with(words: Arc<dyn WordSource>, config: ServerConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            timers: TimerTable::default(),
            words,
            config,
        }
    }

    pub async fn register_connection(
        &self,
        conn_id: &ConnectionId,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.connections.write().await.insert(conn_id.clone(), tx);
    }

    pub async fn unregister_connection(&self, conn_id: &ConnectionId) {
        self.connections.write().await.remove(conn_id);
    }

    /// Subscribe to a room's broadcast channel.
    pub async fn subscribe(&self, code: &str) -> Option<broadcast::Receiver<ServerMessage>> {
        self.channels
            .read()
            .await
            .get(code)
            .map(|tx| tx.subscribe())
    }

    /// Deliver a message to a single connection. Send errors mean the socket
    /// is already gone; disconnect handling picks that up separately.
    pub(crate) async fn send_to(&self, conn_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.connections.read().await.get(conn_id) {
            let _ = tx.send(msg);
        }
    }

    /// Fan a message out to every subscribed member of a room. No receivers
    /// connected is fine.
    pub(crate) async fn broadcast_room(&self, code: &str, msg: ServerMessage) {
        if let Some(tx) = self.channels.read().await.get(code) {
            let _ = tx.send(msg);
        }
    }

    pub(crate) async fn broadcast_update(&self, code: &str, view: RoomView) {
        self.broadcast_room(code, ServerMessage::RoomUpdate { room: view })
            .await;
    }

    /// Broadcast the current snapshot of a room, if it still exists. Used
    /// after a connection (re)joins so the new subscriber gets a snapshot too.
    pub async fn rebroadcast(&self, code: &str) {
        let view = self.rooms.read().await.get(code).map(RoomView::from);
        if let Some(view) = view {
            self.broadcast_update(code, view).await;
        }
    }

    /// Current sanitized snapshot of a room.
    pub async fn snapshot(&self, code: &str) -> Option<RoomView> {
        self.rooms.read().await.get(code).map(RoomView::from)
    }

    pub(crate) async fn insert_channel(&self, code: &str) {
        let (tx, _rx) = broadcast::channel(100);
        self.channels.write().await.insert(code.to_string(), tx);
    }

    pub(crate) async fn remove_channel(&self, code: &str) {
        self.channels.write().await.remove(code);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Create a room with `count` players already joined, bypassing the
    /// socket layer. Player `i` has connection id `conn-{i}` and durable id
    /// `user-{i}`; player 0 is the host.
    pub(crate) async fn room_with_players(state: &AppState, count: usize) -> RoomCode {
        let code = state
            .create_room(
                &"conn-0".to_string(),
                "Jugador0".to_string(),
                None,
                None,
                "user-0".to_string(),
            )
            .await;
        for i in 1..count {
            state
                .join_room(
                    &format!("conn-{i}"),
                    &code,
                    format!("Jugador{i}"),
                    None,
                    None,
                    format!("user-{i}"),
                )
                .await
                .unwrap();
        }
        code
    }

    /// Pin the impostor set to the given connection ids, overriding the
    /// random assignment from `start_game`.
    pub(crate) async fn pin_impostors(state: &AppState, code: &str, ids: &[&str]) {
        let mut rooms = state.rooms.write().await;
        let room = rooms.get_mut(code).unwrap();
        room.impostor_ids = ids.iter().map(|s| s.to_string()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::room_with_players;

    #[tokio::test]
    async fn test_subscribe_unknown_room() {
        let state = AppState::new();
        assert!(state.subscribe("ZZZZ").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_tracks_room() {
        let state = AppState::new();
        let code = room_with_players(&state, 2).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.players.len(), 2);
        assert_eq!(view.state, RoomState::Lobby);
        assert!(state.snapshot("ZZZZ").await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let state = AppState::new();
        let code = room_with_players(&state, 1).await;

        let mut rx = state.subscribe(&code).await.unwrap();
        state.rebroadcast(&code).await;

        match rx.recv().await.unwrap() {
            ServerMessage::RoomUpdate { room } => assert_eq!(room.code, code),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
