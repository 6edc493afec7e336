//! Identity reconciliation across reconnects, disconnect bookkeeping,
//! host transfer and explicit leaves.

use chrono::Utc;

use super::{AppState, RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::timers::TimerPhase;
use crate::types::*;

const PAUSE_REASON: &str = "Esperando reconexión de jugadores... (mínimo 3 jugadores)";

/// Rewrite a reconnecting player's transient id everywhere it appears.
///
/// Every identity-keyed collection must be covered here; missing one silently
/// desynchronizes the room (stale votes, wrong impostor attribution). There is
/// no detection mechanism for a partial rewrite, only this function.
fn reconnect_player(
    room: &mut Room,
    idx: usize,
    new_id: &str,
    name: String,
    color: Option<String>,
    avatar: Option<String>,
) {
    let old_id = std::mem::replace(&mut room.players[idx].id, new_id.to_string());

    let player = &mut room.players[idx];
    player.disconnected = false;
    player.disconnected_at = None;
    player.name = name;
    if let Some(color) = color {
        player.color = color;
    }
    if let Some(avatar) = avatar {
        player.avatar = avatar;
    }

    for id in room.impostor_ids.iter_mut().chain(room.kicked_ids.iter_mut()) {
        if *id == old_id {
            *id = new_id.to_string();
        }
    }

    // Votes: both voter keys and target values can hold the old id
    room.votes = std::mem::take(&mut room.votes)
        .into_iter()
        .map(|(voter, target)| {
            let voter = if voter == old_id { new_id.to_string() } else { voter };
            let target = match target {
                VoteTarget::Player(id) if id == old_id => VoteTarget::Player(new_id.to_string()),
                other => other,
            };
            (voter, target)
        })
        .collect();

    room.ghost_votes = std::mem::take(&mut room.ghost_votes)
        .into_iter()
        .map(|(voter, target)| {
            let voter = if voter == old_id { new_id.to_string() } else { voter };
            let target = if target == old_id { new_id.to_string() } else { target };
            (voter, target)
        })
        .collect();

    if room.submitted.remove(&old_id) {
        room.submitted.insert(new_id.to_string());
    }
}

/// What a reconnect resumed, decided under the room lock and acted on after.
enum Resume {
    None,
    Round { round: u32, secs: u64 },
    Voting { round: u32, secs: u64 },
    Reveal,
}

impl AppState {
    /// Join a room. A known `user_id` reconnects the matching player, with an
    /// exhaustive identity rewrite; an unknown one joins as a new player,
    /// lobby-only.
    pub async fn join_room(
        &self,
        conn_id: &ConnectionId,
        code: &str,
        name: String,
        color: Option<String>,
        avatar: Option<String>,
        user_id: UserId,
    ) -> RoomResult<()> {
        let resume = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(code).ok_or(RoomError::RoomNotFound)?;

            if let Some(idx) = room.players.iter().position(|p| p.user_id == user_id) {
                let old_id = room.players[idx].id.clone();
                tracing::info!(
                    "Player {} reconnected in {} ({} -> {})",
                    room.players[idx].name,
                    code,
                    old_id,
                    conn_id
                );
                reconnect_player(room, idx, conn_id, name, color, avatar);

                let mut resume = Resume::None;
                if room.paused && room.connected_active_count() >= MIN_PLAYERS {
                    room.paused = false;
                    room.pause_reason = None;
                    resume = match room.state {
                        RoomState::Playing if room.settings.timer => {
                            let secs = room.settings.time_limit;
                            room.round_expires_at =
                                Some(Utc::now() + chrono::Duration::seconds(secs as i64));
                            Resume::Round { round: room.round, secs }
                        }
                        RoomState::Voting if room.settings.voting_timer => {
                            let secs = room.settings.voting_time_limit;
                            room.voting_expires_at =
                                Some(Utc::now() + chrono::Duration::seconds(secs as i64));
                            Resume::Voting { round: room.round, secs }
                        }
                        RoomState::Revealing => Resume::Reveal,
                        _ => Resume::None,
                    };
                }
                resume
            } else {
                if room.state != RoomState::Lobby {
                    return Err(RoomError::GameInProgress);
                }
                room.players.push(Player {
                    id: conn_id.clone(),
                    user_id,
                    name,
                    is_host: false,
                    color: color.unwrap_or_else(|| super::registry::DEFAULT_COLOR.to_string()),
                    avatar: avatar.unwrap_or_else(|| super::registry::DEFAULT_AVATAR.to_string()),
                    disconnected: false,
                    disconnected_at: None,
                });
                Resume::None
            }
        };

        match resume {
            Resume::None => {}
            Resume::Round { round, secs } => self.start_round_timer(code, round, secs).await,
            Resume::Voting { round, secs } => self.start_voting_timer(code, round, secs).await,
            Resume::Reveal => self.start_reveal_timer(code).await,
        }
        Ok(())
    }

    /// Explicit departure. The host leaving closes the room for everyone;
    /// anyone else is simply removed.
    pub async fn leave_room(&self, conn_id: &ConnectionId, code: &str) {
        enum Outcome {
            NotAMember,
            CloseRoom,
            Removed(RoomView),
        }

        let outcome = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(code) {
                None => Outcome::NotAMember,
                Some(room) => match room.players.iter().position(|p| p.id == *conn_id) {
                    None => Outcome::NotAMember,
                    Some(idx) if room.players[idx].is_host => Outcome::CloseRoom,
                    Some(idx) => {
                        room.players.remove(idx);
                        room.votes.remove(conn_id);
                        room.ghost_votes.remove(conn_id);
                        room.submitted.remove(conn_id);
                        if room.players.is_empty() {
                            Outcome::CloseRoom
                        } else {
                            if !room.players.iter().any(|p| p.is_host) {
                                room.players[0].is_host = true;
                            }
                            Outcome::Removed(RoomView::from(&*room))
                        }
                    }
                },
            }
        };

        match outcome {
            Outcome::NotAMember => {}
            Outcome::CloseRoom => self.delete_room(code).await,
            Outcome::Removed(view) => self.broadcast_update(code, view).await,
        }
    }

    /// Socket-level disconnect: keep the player for possible reconnection,
    /// transfer the host role, pause or tear down as membership dictates.
    pub async fn handle_disconnect(&self, conn_id: &ConnectionId) {
        struct Outcome {
            code: RoomCode,
            close: bool,
            paused_now: bool,
            notify_host: Option<(ConnectionId, String, usize)>,
            view: Option<RoomView>,
        }

        let outcome = {
            let mut rooms = self.rooms.write().await;
            let mut outcome = None;
            for (code, room) in rooms.iter_mut() {
                let Some(idx) = room.players.iter().position(|p| p.id == *conn_id) else {
                    continue;
                };

                let player_name = room.players[idx].name.clone();
                room.players[idx].disconnected = true;
                room.players[idx].disconnected_at = Some(Utc::now());

                if room.players[idx].is_host {
                    room.players[idx].is_host = false;
                    if let Some(new_host) = room
                        .players
                        .iter_mut()
                        .find(|p| !p.disconnected && p.id != *conn_id)
                    {
                        new_host.is_host = true;
                        tracing::info!(
                            "Host transferred from {} to {} in {}",
                            player_name,
                            new_host.name,
                            code
                        );
                    }
                }

                let active = room.connected_active_count();
                if active <= 1 {
                    tracing::info!(
                        "Room {} closing - only {} active player(s)",
                        code,
                        active
                    );
                    outcome = Some(Outcome {
                        code: code.clone(),
                        close: true,
                        paused_now: false,
                        notify_host: None,
                        view: None,
                    });
                    break;
                }

                let mut paused_now = false;
                if room.in_progress() && active < MIN_PLAYERS && !room.paused {
                    room.paused = true;
                    room.pause_reason = Some(PAUSE_REASON.to_string());
                    room.round_expires_at = None;
                    room.voting_expires_at = None;
                    paused_now = true;
                }

                let notify_host = room
                    .host()
                    .map(|h| (h.id.clone(), player_name.clone(), active));

                outcome = Some(Outcome {
                    code: code.clone(),
                    close: false,
                    paused_now,
                    notify_host,
                    view: Some(RoomView::from(&*room)),
                });
                break;
            }
            outcome
        };

        let Some(outcome) = outcome else {
            return;
        };

        if outcome.close {
            self.delete_room(&outcome.code).await;
            return;
        }

        if outcome.paused_now {
            // Nothing may fire against a paused room
            self.timers.cancel(&outcome.code, TimerPhase::Round).await;
            self.timers.cancel(&outcome.code, TimerPhase::Voting).await;
            self.timers.cancel(&outcome.code, TimerPhase::Reveal).await;
        }

        if let Some((host_id, player_name, active_players)) = outcome.notify_host {
            self.send_to(
                &host_id,
                ServerMessage::PlayerDisconnected {
                    player_name,
                    active_players,
                },
            )
            .await;
        }

        if let Some(view) = outcome.view {
            self.broadcast_update(&outcome.code, view).await;
        }

        self.schedule_cleanup(&outcome.code).await;
    }

    /// Cleanup timer expiry: delete the room if every player is still gone.
    pub(crate) async fn handle_cleanup(&self, code: &str) {
        let all_disconnected = {
            let rooms = self.rooms.read().await;
            match rooms.get(code) {
                Some(room) => room.players.iter().all(|p| p.disconnected),
                None => return,
            }
        };
        if all_disconnected {
            tracing::info!("Room {} abandoned, cleaning up", code);
            self.delete_room(code).await;
        }
    }
}
