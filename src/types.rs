use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomCode = String;
/// Transient per-socket identity, regenerated on every connection
pub type ConnectionId = String;
/// Durable client-chosen identity, survives reconnects
pub type UserId = String;

/// Minimum players to start a game, and to keep an in-progress one running.
pub const MIN_PLAYERS: usize = 3;

/// Lines force-submitted for players who time out while the punishment
/// setting is on.
pub const PUNISHMENTS: &[&str] = &[
    "Soy tonto",
    "Me huelen los pies",
    "Me gusta comer mocos",
    "Soy un bebé llorón",
    "No sé jugar",
    "Mis pedos huelen mal",
    "Ayer me hice pis",
    "Quiero a mi mamá",
    "Soy un gallina",
    "Me he tirado un pedo",
    "Tengo miedo",
    "Soy un perdedor",
];

/// Neutral lines force-submitted on timeout when punishments are off.
pub const TIMEOUT_LINES: &[&str] = &["...", "ZzZ me duermo", "No sé qué decir", "Tiempo agotado"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Lobby,
    Playing,
    Voting,
    Revealing,
    GameOver,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Normal,
    Hard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Civilians,
    Impostors,
}

/// Per-room options, mutable by the host while the room is in the lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub timer: bool,
    pub time_limit: u64,
    pub voting_timer: bool,
    pub voting_time_limit: u64,
    pub punishment: bool,
    pub custom_punishment: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timer: false,
            time_limit: 60,
            voting_timer: false,
            voting_time_limit: 30,
            punishment: false,
            // Empty means "draw a random line from the stock pool"
            custom_punishment: String::new(),
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub timer: Option<bool>,
    pub time_limit: Option<u64>,
    pub voting_timer: Option<bool>,
    pub voting_time_limit: Option<u64>,
    pub punishment: Option<bool>,
    pub custom_punishment: Option<String>,
}

impl Settings {
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.timer {
            self.timer = v;
        }
        if let Some(v) = patch.time_limit {
            self.time_limit = v;
        }
        if let Some(v) = patch.voting_timer {
            self.voting_timer = v;
        }
        if let Some(v) = patch.voting_time_limit {
            self.voting_time_limit = v;
        }
        if let Some(v) = patch.punishment {
            self.punishment = v;
        }
        if let Some(v) = patch.custom_punishment {
            self.custom_punishment = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub is_host: bool,
    pub color: String,
    pub avatar: String,
    #[serde(default)]
    pub disconnected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
}

/// One entry of the public clue feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClueEntry {
    pub player_name: String,
    pub term: String,
    pub round: u32,
}

/// A ballot target: either a player's connection id or the skip sentinel.
/// Serialized as a plain string with `"skip"` reserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum VoteTarget {
    Player(ConnectionId),
    Skip,
}

impl From<String> for VoteTarget {
    fn from(s: String) -> Self {
        if s == "skip" {
            Self::Skip
        } else {
            Self::Player(s)
        }
    }
}

impl From<VoteTarget> for String {
    fn from(t: VoteTarget) -> Self {
        match t {
            VoteTarget::Player(id) => id,
            VoteTarget::Skip => "skip".to_string(),
        }
    }
}

/// The authoritative room aggregate. Scheduling state (timer handles) lives
/// outside this struct, in the timer table, so it can never end up in a
/// client-facing snapshot.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    /// Insertion order is join order; host promotion relies on it.
    pub players: Vec<Player>,
    pub state: RoomState,
    pub difficulty: Difficulty,
    /// `None` means "mix": draw pairs from every category.
    pub category: Option<String>,
    pub word: String,
    /// Empty in normal difficulty.
    pub impostor_word: String,
    pub impostor_ids: Vec<ConnectionId>,
    pub round: u32,
    pub inputs: Vec<ClueEntry>,
    /// Players who already submitted a clue this round.
    pub submitted: HashSet<ConnectionId>,
    pub kicked_ids: Vec<ConnectionId>,
    pub votes: HashMap<ConnectionId, VoteTarget>,
    /// Non-binding ballots from eliminated players; never tallied.
    pub ghost_votes: HashMap<ConnectionId, ConnectionId>,
    pub winner: Option<Winner>,
    pub punishment_line: Option<String>,
    pub settings: Settings,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub round_expires_at: Option<DateTime<Utc>>,
    pub voting_expires_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            players: Vec::new(),
            state: RoomState::Lobby,
            difficulty: Difficulty::Normal,
            category: None,
            word: String::new(),
            impostor_word: String::new(),
            impostor_ids: Vec::new(),
            round: 0,
            inputs: Vec::new(),
            submitted: HashSet::new(),
            kicked_ids: Vec::new(),
            votes: HashMap::new(),
            ghost_votes: HashMap::new(),
            winner: None,
            punishment_line: None,
            settings: Settings::default(),
            paused: false,
            pause_reason: None,
            round_expires_at: None,
            voting_expires_at: None,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.player(id).is_some_and(|p| p.is_host)
    }

    pub fn is_kicked(&self, id: &str) -> bool {
        self.kicked_ids.iter().any(|k| k == id)
    }

    /// Players still eligible to submit and vote (not eliminated).
    pub fn active_players(&self) -> impl Iterator<Item = &Player> + '_ {
        self.players.iter().filter(|p| !self.is_kicked(&p.id))
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    /// Active players who are currently connected; drives pause and teardown.
    pub fn connected_active_count(&self) -> usize {
        self.active_players().filter(|p| !p.disconnected).count()
    }

    pub fn in_progress(&self) -> bool {
        matches!(
            self.state,
            RoomState::Playing | RoomState::Voting | RoomState::Revealing
        )
    }
}

/// Client-facing snapshot of a room. Derived from [`Room`]; constructing the
/// broadcast payload from this type (and never from `Room` directly) is what
/// keeps internal scheduling state off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub code: RoomCode,
    pub players: Vec<Player>,
    pub state: RoomState,
    pub difficulty: Difficulty,
    pub category: Option<String>,
    pub word: String,
    pub impostor_word: String,
    pub impostor_ids: Vec<ConnectionId>,
    pub round: u32,
    pub inputs: Vec<ClueEntry>,
    pub submitted: Vec<ConnectionId>,
    pub kicked_ids: Vec<ConnectionId>,
    pub votes: HashMap<ConnectionId, VoteTarget>,
    pub ghost_votes: HashMap<ConnectionId, ConnectionId>,
    pub winner: Option<Winner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punishment_line: Option<String>,
    pub settings: Settings,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting_expires_at: Option<DateTime<Utc>>,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        let mut submitted: Vec<ConnectionId> = room.submitted.iter().cloned().collect();
        submitted.sort();
        Self {
            code: room.code.clone(),
            players: room.players.clone(),
            state: room.state,
            difficulty: room.difficulty,
            category: room.category.clone(),
            word: room.word.clone(),
            impostor_word: room.impostor_word.clone(),
            impostor_ids: room.impostor_ids.clone(),
            round: room.round,
            inputs: room.inputs.clone(),
            submitted,
            kicked_ids: room.kicked_ids.clone(),
            votes: room.votes.clone(),
            ghost_votes: room.ghost_votes.clone(),
            winner: room.winner,
            punishment_line: room.punishment_line.clone(),
            settings: room.settings.clone(),
            paused: room.paused,
            pause_reason: room.pause_reason.clone(),
            round_expires_at: room.round_expires_at,
            voting_expires_at: room.voting_expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_target_skip_sentinel() {
        let skip: VoteTarget = "skip".to_string().into();
        assert_eq!(skip, VoteTarget::Skip);

        let player: VoteTarget = "01ABC".to_string().into();
        assert_eq!(player, VoteTarget::Player("01ABC".to_string()));

        assert_eq!(String::from(VoteTarget::Skip), "skip");
    }

    #[test]
    fn test_settings_merge_is_partial() {
        let mut settings = Settings::default();
        settings.merge(SettingsPatch {
            timer: Some(true),
            time_limit: Some(30),
            ..Default::default()
        });

        assert!(settings.timer);
        assert_eq!(settings.time_limit, 30);
        // Untouched fields keep defaults
        assert!(!settings.punishment);
        assert_eq!(settings.voting_time_limit, 30);
    }

    #[test]
    fn test_active_counts_exclude_kicked_and_disconnected() {
        let mut room = Room::new("TEST".to_string());
        for (i, name) in ["ana", "bea", "carl"].iter().enumerate() {
            room.players.push(Player {
                id: format!("conn-{i}"),
                user_id: format!("user-{i}"),
                name: name.to_string(),
                is_host: i == 0,
                color: "#6d28d9".to_string(),
                avatar: "👤".to_string(),
                disconnected: false,
                disconnected_at: None,
            });
        }

        assert_eq!(room.active_count(), 3);

        room.kicked_ids.push("conn-1".to_string());
        assert_eq!(room.active_count(), 2);
        assert_eq!(room.connected_active_count(), 2);

        room.player_mut("conn-2").unwrap().disconnected = true;
        assert_eq!(room.active_count(), 2);
        assert_eq!(room.connected_active_count(), 1);
    }

    #[test]
    fn test_room_view_serializes_camel_case() {
        let room = Room::new("AB12".to_string());
        let view = RoomView::from(&room);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["state"], "lobby");
        assert!(json.get("impostorIds").is_some());
        assert!(json.get("kickedIds").is_some());
        // Scheduling state is absent, not null-stripped at runtime
        assert!(json.get("timerId").is_none());
    }
}
