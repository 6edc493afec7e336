//! Round setup and clue submission.

use chrono::Utc;
use rand::Rng;

use super::{AppState, RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::timers::TimerPhase;
use crate::types::*;

/// Impostor count by table size.
pub(crate) fn impostor_count_for(player_count: usize) -> usize {
    match player_count {
        n if n < 6 => 1,
        n if n < 9 => 2,
        n if n < 12 => 3,
        _ => 4,
    }
}

/// Record one clue submission. Returns true when this submission completed
/// the round and the room moved to voting. Repeat submissions by the same
/// player within a round are ignored.
pub(super) fn apply_submission(room: &mut Room, conn_id: &str, term: String) -> bool {
    if !room.submitted.insert(conn_id.to_string()) {
        return false;
    }
    let player_name = room
        .player(conn_id)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    room.inputs.push(ClueEntry {
        player_name,
        term,
        round: room.round,
    });

    if room.submitted.len() >= room.active_count() {
        room.state = RoomState::Voting;
        room.votes.clear();
        room.ghost_votes.clear();
        room.submitted.clear();
        room.round_expires_at = None;
        if room.settings.voting_timer {
            room.voting_expires_at =
                Some(Utc::now() + chrono::Duration::seconds(room.settings.voting_time_limit as i64));
        }
        true
    } else {
        false
    }
}

impl AppState {
    /// Start a game: assign words and impostor roles, then enter `playing`.
    /// Host-only, lobby-only, and requires at least [`MIN_PLAYERS`].
    pub async fn start_game(&self, conn_id: &ConnectionId, code: &str) -> RoomResult<()> {
        let (view, round, round_secs) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Lobby {
                return Err(RoomError::InvalidState);
            }
            if !room.is_host(conn_id) {
                return Err(RoomError::NotHost("empezar la partida"));
            }
            if room.players.len() < MIN_PLAYERS {
                return Err(RoomError::NotEnoughPlayers);
            }

            let pair = self.words.draw(room.category.as_deref());
            {
                let mut rng = rand::rng();
                match room.difficulty {
                    Difficulty::Hard => {
                        // Related pair, randomly deciding which side the impostors see
                        let (word, impostor_word) = if rng.random_bool(0.5) {
                            (pair.word, pair.related)
                        } else {
                            (pair.related, pair.word)
                        };
                        room.word = word;
                        room.impostor_word = impostor_word;
                    }
                    Difficulty::Normal => {
                        room.word = if rng.random_bool(0.5) {
                            pair.word
                        } else {
                            pair.related
                        };
                        room.impostor_word = String::new();
                    }
                }

                let count = impostor_count_for(room.players.len());
                room.impostor_ids =
                    rand::seq::index::sample(&mut rng, room.players.len(), count)
                        .into_iter()
                        .map(|i| room.players[i].id.clone())
                        .collect();
            }

            room.state = RoomState::Playing;
            room.round = 1;
            room.inputs.clear();
            room.submitted.clear();
            room.votes.clear();
            room.ghost_votes.clear();
            room.kicked_ids.clear();
            room.winner = None;
            room.punishment_line = None;

            let round_secs = room.settings.timer.then_some(room.settings.time_limit);
            if let Some(secs) = round_secs {
                room.round_expires_at = Some(Utc::now() + chrono::Duration::seconds(secs as i64));
            }

            (RoomView::from(&*room), room.round, round_secs)
        };

        tracing::info!("Room {} started a game", code);
        self.broadcast_room(code, ServerMessage::GameStarted { room: view.clone() })
            .await;
        self.broadcast_update(code, view).await;
        if let Some(secs) = round_secs {
            self.start_round_timer(code, round, secs).await;
        }
        Ok(())
    }

    /// Record a clue from an active player. Completing the round moves the
    /// room to voting.
    pub async fn submit_term(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        term: String,
    ) -> RoomResult<()> {
        let (view, entered_voting, round, voting_secs) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Playing || room.paused {
                return Err(RoomError::InvalidState);
            }
            room.player(conn_id).ok_or(RoomError::NotInRoom)?;
            if room.is_kicked(conn_id) {
                return Err(RoomError::InvalidState);
            }

            let entered_voting = apply_submission(room, conn_id, term);
            let voting_secs = room.settings.voting_timer.then_some(room.settings.voting_time_limit);
            (RoomView::from(&*room), entered_voting, room.round, voting_secs)
        };

        if entered_voting {
            self.timers.cancel(code, TimerPhase::Round).await;
        }
        self.broadcast_update(code, view).await;
        if entered_voting {
            if let Some(secs) = voting_secs {
                self.start_voting_timer(code, round, secs).await;
            }
        }
        Ok(())
    }

    /// Round timer expiry: force-submit a line for everyone who has not
    /// submitted this round, through the normal submission path.
    pub(crate) async fn handle_round_timeout(&self, code: &str, round: u32) {
        let Some((view, entered_voting, voting_secs)) = ({
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(code) {
                Some(room)
                    if room.state == RoomState::Playing
                        && room.round == round
                        && !room.paused =>
                {
                    let pending: Vec<ConnectionId> = room
                        .active_players()
                        .filter(|p| !room.submitted.contains(&p.id))
                        .map(|p| p.id.clone())
                        .collect();

                    let mut entered_voting = false;
                    {
                        let mut rng = rand::rng();
                        for conn_id in pending {
                            let lines = if room.settings.punishment {
                                PUNISHMENTS
                            } else {
                                TIMEOUT_LINES
                            };
                            let term = lines[rng.random_range(0..lines.len())].to_string();
                            tracing::info!(
                                "Round timer expired in {}, submitting for {}: {}",
                                code,
                                conn_id,
                                term
                            );
                            entered_voting |= apply_submission(room, &conn_id, term);
                        }
                    }
                    let voting_secs =
                        room.settings.voting_timer.then_some(room.settings.voting_time_limit);
                    Some((RoomView::from(&*room), entered_voting, voting_secs))
                }
                // Room deleted or already past this round; nothing to do
                _ => None,
            }
        }) else {
            return;
        };

        self.broadcast_update(code, view).await;
        if entered_voting {
            if let Some(secs) = voting_secs {
                self.start_voting_timer(code, round, secs).await;
            }
        }
    }

    /// Return the room to the lobby, clearing all game-scoped state while
    /// preserving players and configuration.
    pub async fn restart_game(&self, conn_id: &ConnectionId, code: &str) -> RoomResult<()> {
        let view = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if !room.is_host(conn_id) {
                return Err(RoomError::NotHost("reiniciar la partida"));
            }
            room.state = RoomState::Lobby;
            room.word.clear();
            room.impostor_word.clear();
            room.impostor_ids.clear();
            room.round = 0;
            room.inputs.clear();
            room.submitted.clear();
            room.votes.clear();
            room.ghost_votes.clear();
            room.kicked_ids.clear();
            room.winner = None;
            room.punishment_line = None;
            room.paused = false;
            room.pause_reason = None;
            room.round_expires_at = None;
            room.voting_expires_at = None;
            RoomView::from(&*room)
        };

        self.timers.cancel(code, TimerPhase::Round).await;
        self.timers.cancel(code, TimerPhase::Voting).await;
        self.timers.cancel(code, TimerPhase::Reveal).await;
        self.broadcast_update(code, view).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::room_with_players;

    #[test]
    fn test_impostor_count_thresholds() {
        assert_eq!(impostor_count_for(3), 1);
        assert_eq!(impostor_count_for(5), 1);
        assert_eq!(impostor_count_for(6), 2);
        assert_eq!(impostor_count_for(8), 2);
        assert_eq!(impostor_count_for(9), 3);
        assert_eq!(impostor_count_for(11), 3);
        assert_eq!(impostor_count_for(12), 4);
        assert_eq!(impostor_count_for(20), 4);
    }

    #[tokio::test]
    async fn test_start_requires_three_players() {
        let state = AppState::new();
        let code = room_with_players(&state, 2).await;

        let err = state
            .start_game(&"conn-0".to_string(), &code)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NotEnoughPlayers);
        assert_eq!(state.snapshot(&code).await.unwrap().state, RoomState::Lobby);
    }

    #[tokio::test]
    async fn test_start_is_host_only() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;

        let err = state
            .start_game(&"conn-1".to_string(), &code)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::NotHost(_)));
    }

    #[tokio::test]
    async fn test_start_normal_mode_assigns_one_word() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Playing);
        assert_eq!(view.round, 1);
        assert_eq!(view.impostor_ids.len(), 1);
        assert!(!view.word.is_empty());
        assert!(view.impostor_word.is_empty());
        assert!(view.inputs.is_empty());
        assert!(view.kicked_ids.is_empty());
    }

    #[tokio::test]
    async fn test_start_hard_mode_assigns_related_pair() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state
            .set_difficulty(&"conn-0".to_string(), &code, Difficulty::Hard)
            .await
            .unwrap();
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert!(!view.word.is_empty());
        assert!(!view.impostor_word.is_empty());
        assert_ne!(view.word, view.impostor_word);
    }

    #[tokio::test]
    async fn test_impostors_are_distinct_players() {
        let state = AppState::new();
        let code = room_with_players(&state, 7).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.impostor_ids.len(), 2);
        let unique: std::collections::HashSet<_> = view.impostor_ids.iter().collect();
        assert_eq!(unique.len(), 2);
        for id in &view.impostor_ids {
            assert!(view.players.iter().any(|p| &p.id == id));
        }
    }

    #[tokio::test]
    async fn test_round_completes_when_everyone_submits() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        for i in 0..2 {
            state
                .submit_term(&format!("conn-{i}"), &code, format!("pista{i}"))
                .await
                .unwrap();
            assert_eq!(
                state.snapshot(&code).await.unwrap().state,
                RoomState::Playing
            );
        }

        state
            .submit_term(&"conn-2".to_string(), &code, "pista2".to_string())
            .await
            .unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Voting);
        assert_eq!(view.inputs.len(), 3);
        assert!(view.votes.is_empty());
        assert!(view.submitted.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_submission_ignored() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        state
            .submit_term(&"conn-0".to_string(), &code, "una".to_string())
            .await
            .unwrap();
        state
            .submit_term(&"conn-0".to_string(), &code, "otra".to_string())
            .await
            .unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.inputs.len(), 1);
        assert_eq!(view.inputs[0].term, "una");
        assert_eq!(view.state, RoomState::Playing);
    }

    #[tokio::test]
    async fn test_round_timeout_synthesizes_missing_clues() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        state
            .submit_term(&"conn-0".to_string(), &code, "real".to_string())
            .await
            .unwrap();

        state.handle_round_timeout(&code, 1).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Voting);
        assert_eq!(view.inputs.len(), 3);
        // Synthesized lines come from the neutral pool when punishments are off
        for entry in &view.inputs[1..] {
            assert!(TIMEOUT_LINES.contains(&entry.term.as_str()));
        }
    }

    #[tokio::test]
    async fn test_round_timeout_for_stale_round_is_ignored() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();

        // A timer scheduled for a round that is no longer current must not fire
        state.handle_round_timeout(&code, 7).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Playing);
        assert!(view.inputs.is_empty());
    }

    #[tokio::test]
    async fn test_restart_preserves_players_and_settings() {
        let state = AppState::new();
        let code = room_with_players(&state, 3).await;
        state
            .update_settings(
                &"conn-0".to_string(),
                &code,
                SettingsPatch {
                    punishment: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();
        state
            .restart_game(&"conn-0".to_string(), &code)
            .await
            .unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Lobby);
        assert_eq!(view.players.len(), 3);
        assert!(view.settings.punishment);
        assert!(view.impostor_ids.is_empty());
        assert!(view.word.is_empty());
        assert!(view.winner.is_none());
    }
}
