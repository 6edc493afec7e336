//! Per-room countdowns.
//!
//! Every countdown is a spawned task keyed by `(room code, phase)`. Starting
//! a timer for a key cancels any previous one; leaving a phase cancels its
//! timer. A room may be deleted (or move on) between scheduling and firing,
//! so every expiry re-enters the state layer through a handler that verifies
//! the room still exists and is where the timer left it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::state::AppState;
use crate::types::RoomCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPhase {
    Round,
    Voting,
    Reveal,
    Cleanup,
}

/// Scheduled-task handles. Handles never leave the server; clients only see
/// expiry timestamps in the room snapshot.
#[derive(Clone, Default)]
pub struct TimerTable {
    tasks: Arc<Mutex<HashMap<(RoomCode, TimerPhase), JoinHandle<()>>>>,
}

impl TimerTable {
    /// Register a task for `(code, phase)`, aborting any previous one.
    pub async fn set(&self, code: RoomCode, phase: TimerPhase, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.lock().await.insert((code, phase), handle) {
            old.abort();
        }
    }

    pub async fn cancel(&self, code: &str, phase: TimerPhase) {
        if let Some(handle) = self.tasks.lock().await.remove(&(code.to_string(), phase)) {
            handle.abort();
        }
    }

    /// Drop the entry without aborting. An expiring task calls this on itself
    /// before running its handler, so a later `set` cannot abort it mid-fire.
    pub async fn clear(&self, code: &str, phase: TimerPhase) {
        self.tasks.lock().await.remove(&(code.to_string(), phase));
    }

    pub async fn cancel_all(&self, code: &str) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|(task_code, _), handle| {
            if task_code == code {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

impl AppState {
    /// Countdown for the clue-submission phase. On expiry, players who have
    /// not submitted get a line force-submitted on their behalf.
    pub(crate) async fn start_round_timer(&self, code: &str, round: u32, secs: u64) {
        let state = self.clone();
        let task_code = code.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            state.timers.clear(&task_code, TimerPhase::Round).await;
            state.handle_round_timeout(&task_code, round).await;
        });
        self.timers.set(code.to_string(), TimerPhase::Round, handle).await;
    }

    /// Countdown for the voting phase. On expiry the tally runs with the
    /// votes actually cast.
    pub(crate) async fn start_voting_timer(&self, code: &str, round: u32, secs: u64) {
        let state = self.clone();
        let task_code = code.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            state.timers.clear(&task_code, TimerPhase::Voting).await;
            state.handle_voting_timeout(&task_code, round).await;
        });
        self.timers.set(code.to_string(), TimerPhase::Voting, handle).await;
    }

    /// Fixed-length pacing state between the tally and the next round (or the
    /// end of the game).
    pub(crate) async fn start_reveal_timer(&self, code: &str) {
        let secs = self.config.reveal_secs;
        let state = self.clone();
        let task_code = code.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            state.timers.clear(&task_code, TimerPhase::Reveal).await;
            state.resolve_reveal(&task_code).await;
        });
        self.timers.set(code.to_string(), TimerPhase::Reveal, handle).await;
    }

    /// Grace period after a disconnect; tears the room down if everyone is
    /// still gone when it fires.
    pub(crate) async fn schedule_cleanup(&self, code: &str) {
        let secs = self.config.cleanup_grace_secs;
        let state = self.clone();
        let task_code = code.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            state.timers.clear(&task_code, TimerPhase::Cleanup).await;
            state.handle_cleanup(&task_code).await;
        });
        self.timers.set(code.to_string(), TimerPhase::Cleanup, handle).await;
    }
}
