//! Voting, elimination tallies, win detection and the reveal pacing state.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::BoxFuture;
use rand::Rng;

use super::{AppState, RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::timers::TimerPhase;
use crate::types::*;

/// Tally the cast votes and move the room to `revealing`.
///
/// Strict majority only: a tie for the top count, or a skip majority,
/// eliminates nobody. The win condition is evaluated immediately after an
/// elimination; `revealing` is pure pacing and the outcome is already fixed
/// in `winner` when it starts.
pub(super) fn tally_votes(room: &mut Room) {
    let elected: Option<ConnectionId> = {
        let mut counts: HashMap<&VoteTarget, usize> = HashMap::new();
        for target in room.votes.values() {
            *counts.entry(target).or_insert(0) += 1;
        }

        let mut max = 0usize;
        let mut candidate: Option<&VoteTarget> = None;
        let mut tie = false;
        for (target, n) in counts {
            if n > max {
                max = n;
                candidate = Some(target);
                tie = false;
            } else if n == max {
                tie = true;
            }
        }

        match candidate {
            Some(VoteTarget::Player(id)) if !tie => Some(id.clone()),
            _ => None,
        }
    };

    if let Some(id) = elected {
        room.kicked_ids.push(id);

        let impostors_left = room
            .impostor_ids
            .iter()
            .filter(|id| !room.is_kicked(id))
            .count();
        let civilians_left = room
            .players
            .iter()
            .filter(|p| !room.impostor_ids.contains(&p.id) && !room.is_kicked(&p.id))
            .count();

        room.winner = if impostors_left == 0 {
            Some(Winner::Civilians)
        } else if impostors_left >= civilians_left {
            // Exact parity counts as an impostor win
            Some(Winner::Impostors)
        } else {
            None
        };
    }

    room.state = RoomState::Revealing;
    room.voting_expires_at = None;
}

impl AppState {
    /// Cast (or overwrite) a ballot. Reaching one vote per active player
    /// triggers the tally.
    pub async fn vote(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        target: VoteTarget,
    ) -> RoomResult<()> {
        let (view, tallied) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Voting || room.paused {
                return Err(RoomError::InvalidState);
            }
            room.player(conn_id).ok_or(RoomError::NotInRoom)?;
            if room.is_kicked(conn_id) {
                // Ghosts get the non-binding variant
                return Err(RoomError::InvalidState);
            }

            room.votes.insert(conn_id.clone(), target);
            let tallied = room.votes.len() >= room.active_count();
            if tallied {
                tally_votes(room);
            }
            (RoomView::from(&*room), tallied)
        };

        if tallied {
            self.timers.cancel(code, TimerPhase::Voting).await;
        }
        self.broadcast_update(code, view).await;
        if tallied {
            self.start_reveal_timer(code).await;
        }
        Ok(())
    }

    /// Non-binding ballot from an eliminated player. Broadcast for pressure,
    /// never tallied.
    pub async fn ghost_vote(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        target: ConnectionId,
    ) -> RoomResult<()> {
        let view = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;
            if room.state != RoomState::Voting || room.paused {
                return Err(RoomError::InvalidState);
            }
            if !room.is_kicked(conn_id) {
                return Err(RoomError::InvalidState);
            }
            room.ghost_votes.insert(conn_id.clone(), target);
            RoomView::from(&*room)
        };
        self.broadcast_update(code, view).await;
        Ok(())
    }

    /// Cosmetic reaction from an eliminated player; broadcast, never stored.
    pub async fn ghost_action(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        emoji: String,
    ) -> RoomResult<()> {
        {
            let rooms = self.rooms.read().await;
            let room = rooms.get(code).ok_or(RoomError::RoomNotFound)?;
            if !room.is_kicked(conn_id) {
                return Err(RoomError::InvalidState);
            }
        }
        self.broadcast_room(
            code,
            ServerMessage::GhostReaction {
                emoji,
                from_id: conn_id.clone(),
            },
        )
        .await;
        Ok(())
    }

    /// Voting timer expiry: tally with the votes actually cast.
    pub(crate) async fn handle_voting_timeout(&self, code: &str, round: u32) {
        let view = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(code) {
                Some(room)
                    if room.state == RoomState::Voting
                        && room.round == round
                        && !room.paused =>
                {
                    tally_votes(room);
                    RoomView::from(&*room)
                }
                _ => return,
            }
        };

        self.broadcast_update(code, view).await;
        self.start_reveal_timer(code).await;
    }

    /// Leave the reveal pacing state: finish the game if the tally decided
    /// it, otherwise advance to the next round.
    ///
    /// The timer chain is cyclic (the reveal schedules the next round, whose
    /// timers eventually schedule another reveal), so this future is boxed to
    /// give the recursion a concrete type the spawned tasks can carry.
    pub(crate) fn resolve_reveal<'a>(&'a self, code: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(self.resolve_reveal_inner(code))
    }

    async fn resolve_reveal_inner(&self, code: &str) {
        let (view, round_timer) = {
            let mut rooms = self.rooms.write().await;
            let Some(room) = rooms.get_mut(code) else {
                return;
            };
            if room.state != RoomState::Revealing || room.paused {
                return;
            }

            let mut round_timer = None;
            match room.winner {
                Some(winner) => {
                    room.state = RoomState::GameOver;
                    room.round_expires_at = None;
                    room.voting_expires_at = None;
                    if room.settings.punishment {
                        let mut rng = rand::rng();
                        let line = if room.settings.custom_punishment.is_empty() {
                            PUNISHMENTS[rng.random_range(0..PUNISHMENTS.len())].to_string()
                        } else {
                            room.settings.custom_punishment.clone()
                        };
                        room.punishment_line = Some(line);
                    }
                    tracing::info!("Room {} game over, winner: {:?}", code, winner);
                }
                None => {
                    room.round += 1;
                    room.inputs.clear();
                    room.submitted.clear();
                    room.votes.clear();
                    room.ghost_votes.clear();
                    room.state = RoomState::Playing;
                    if room.settings.timer {
                        let secs = room.settings.time_limit;
                        room.round_expires_at =
                            Some(Utc::now() + chrono::Duration::seconds(secs as i64));
                        round_timer = Some((room.round, secs));
                    }
                }
            }
            (RoomView::from(&*room), round_timer)
        };

        self.broadcast_update(code, view).await;
        if let Some((round, secs)) = round_timer {
            self.start_round_timer(code, round, secs).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{pin_impostors, room_with_players};

    /// Drive a fresh 4-player room into the voting phase with "conn-3" as
    /// the only impostor.
    async fn voting_room(state: &AppState) -> RoomCode {
        let code = room_with_players(state, 4).await;
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();
        pin_impostors(state, &code, &["conn-3"]).await;
        for i in 0..4 {
            state
                .submit_term(&format!("conn-{i}"), &code, format!("pista{i}"))
                .await
                .unwrap();
        }
        assert_eq!(
            state.snapshot(&code).await.unwrap().state,
            RoomState::Voting
        );
        code
    }

    fn target(id: &str) -> VoteTarget {
        VoteTarget::Player(id.to_string())
    }

    #[tokio::test]
    async fn test_strict_majority_eliminates() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        state.vote(&"conn-0".to_string(), &code, target("conn-3")).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, target("conn-3")).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, target("conn-0")).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, VoteTarget::Skip).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.kicked_ids, vec!["conn-3".to_string()]);
        assert_eq!(view.state, RoomState::Revealing);
        // The only impostor is out: civilians win
        assert_eq!(view.winner, Some(Winner::Civilians));

        state.resolve_reveal(&code).await;
        assert_eq!(
            state.snapshot(&code).await.unwrap().state,
            RoomState::GameOver
        );
    }

    #[tokio::test]
    async fn test_tie_eliminates_nobody() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        state.vote(&"conn-0".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, target("conn-0")).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, target("conn-0")).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert!(view.kicked_ids.is_empty());
        assert_eq!(view.state, RoomState::Revealing);
        assert!(view.winner.is_none());

        state.resolve_reveal(&code).await;
        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Playing);
        assert_eq!(view.round, 2);
        assert!(view.inputs.is_empty());
    }

    #[tokio::test]
    async fn test_skip_majority_eliminates_nobody() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        state.vote(&"conn-0".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, target("conn-0")).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert!(view.kicked_ids.is_empty());
        assert!(view.winner.is_none());
    }

    #[tokio::test]
    async fn test_impostor_parity_wins_for_impostors() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        // Eliminating a civilian leaves 1 impostor vs 2 civilians: continue.
        state.vote(&"conn-0".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, target("conn-1")).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.kicked_ids, vec!["conn-1".to_string()]);
        assert!(view.winner.is_none());
        state.resolve_reveal(&code).await;

        // Next round: eliminating another civilian reaches 1 vs 1 parity.
        for id in ["conn-0", "conn-2", "conn-3"] {
            state
                .submit_term(&id.to_string(), &code, "pista".to_string())
                .await
                .unwrap();
        }
        state.vote(&"conn-0".to_string(), &code, target("conn-2")).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, target("conn-2")).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.winner, Some(Winner::Impostors));
    }

    #[tokio::test]
    async fn test_duplicate_vote_overwrites() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        state.vote(&"conn-0".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-0".to_string(), &code, target("conn-2")).await.unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.votes.len(), 1);
        assert_eq!(view.votes["conn-0"], target("conn-2"));
        assert_eq!(view.state, RoomState::Voting);
    }

    #[tokio::test]
    async fn test_ghost_vote_never_counts() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        // Eliminate conn-1 to create a ghost
        state.vote(&"conn-0".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, VoteTarget::Skip).await.unwrap();
        state.vote(&"conn-2".to_string(), &code, target("conn-1")).await.unwrap();
        state.vote(&"conn-3".to_string(), &code, target("conn-1")).await.unwrap();
        state.resolve_reveal(&code).await;

        for id in ["conn-0", "conn-2", "conn-3"] {
            state
                .submit_term(&id.to_string(), &code, "pista".to_string())
                .await
                .unwrap();
        }

        // Ghost may not cast a real vote
        let err = state
            .vote(&"conn-1".to_string(), &code, target("conn-0"))
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::InvalidState);

        state
            .ghost_vote(&"conn-1".to_string(), &code, "conn-0".to_string())
            .await
            .unwrap();

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.ghost_votes["conn-1"], "conn-0");
        // Ghost ballot did not advance the tally
        assert_eq!(view.state, RoomState::Voting);
        assert!(view.votes.is_empty());
    }

    #[tokio::test]
    async fn test_ghost_action_requires_elimination() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        let err = state
            .ghost_action(&"conn-0".to_string(), &code, "👻".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::InvalidState);
    }

    #[tokio::test]
    async fn test_voting_timeout_tallies_partial_votes() {
        let state = AppState::new();
        let code = voting_room(&state).await;

        state.vote(&"conn-0".to_string(), &code, target("conn-3")).await.unwrap();
        state.vote(&"conn-1".to_string(), &code, target("conn-3")).await.unwrap();

        state.handle_voting_timeout(&code, 1).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::Revealing);
        assert_eq!(view.kicked_ids, vec!["conn-3".to_string()]);
        assert_eq!(view.winner, Some(Winner::Civilians));
    }

    #[tokio::test]
    async fn test_punishment_line_assigned_at_game_over() {
        let state = AppState::new();
        let code = room_with_players(&state, 4).await;
        state
            .update_settings(
                &"conn-0".to_string(),
                &code,
                SettingsPatch {
                    punishment: Some(true),
                    custom_punishment: Some("He perdido".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        state.start_game(&"conn-0".to_string(), &code).await.unwrap();
        pin_impostors(&state, &code, &["conn-3"]).await;
        for i in 0..4 {
            state
                .submit_term(&format!("conn-{i}"), &code, "pista".to_string())
                .await
                .unwrap();
        }
        for i in 0..4 {
            state
                .vote(&format!("conn-{i}"), &code, target("conn-3"))
                .await
                .unwrap();
        }
        state.resolve_reveal(&code).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::GameOver);
        assert_eq!(view.punishment_line.as_deref(), Some("He perdido"));
    }

    #[tokio::test]
    async fn test_stock_punishment_line_when_no_custom_configured() {
        let state = AppState::new();
        let code = room_with_players(&state, 4).await;
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
        pin_impostors(&state, &code, &["conn-3"]).await;
        for i in 0..4 {
            state
                .submit_term(&format!("conn-{i}"), &code, "pista".to_string())
                .await
                .unwrap();
        }
        for i in 0..4 {
            state
                .vote(&format!("conn-{i}"), &code, target("conn-3"))
                .await
                .unwrap();
        }
        state.resolve_reveal(&code).await;

        let view = state.snapshot(&code).await.unwrap();
        assert_eq!(view.state, RoomState::GameOver);
        // No custom line configured: the stock pool supplies one
        let line = view.punishment_line.expect("punishment line assigned");
        assert!(PUNISHMENTS.contains(&line.as_str()));
    }
}
