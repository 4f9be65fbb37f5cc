//! Per-session game state
//!
//! A session is a single playthrough bound to one endpoint pair and its
//! participants (two for multiplayer, one for solo). This module holds the
//! session record and the pure pieces of its state machine: ready
//! tracking, submission validation, strike accounting, and scoring. The
//! engine in [`crate::engine`] owns orchestration, emissions, and timers.

use std::time::Instant;

use tokio::task::JoinHandle;

use gridlink_shared::{
    ConnectionType, Difficulty, Mode, PlayerId, PlayerInfo, SessionId, UserId,
};

use crate::engine::{ChannelHandle, ChannelId};
use crate::error::GraphError;
use crate::graph::GraphStore;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Multiplayer pre-game: both participants attached, not all ready.
    Waiting,
    /// Game in progress; submissions and give-ups are accepted.
    Active,
    /// Terminal. Any further input for the session is ignored.
    Finished,
}

/// One participant: the channel it plays over and its ready flag.
#[derive(Debug)]
pub struct Participant {
    pub handle: ChannelHandle,
    pub ready: bool,
}

/// Outcome of marking a participant ready.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Newly marked; `all_ready` reports whether the game can start.
    Marked { all_ready: bool },
    /// Already ready; idempotent no-op.
    AlreadyReady,
    /// Channel is not part of this session.
    NotParticipant,
}

/// Verdict of the four submission validity rules.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// All rules hold; `edges` is the submitted path's hop count.
    Valid { edges: usize },
    Invalid,
}

/// Authoritative per-session record. Mutated only under the engine's
/// per-session lock.
pub struct Session {
    pub id: SessionId,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub start_player: PlayerInfo,
    pub end_player: PlayerInfo,
    pub status: SessionStatus,
    pub participants: Vec<Participant>,
    /// Fixed at session creation; the solo stopwatch reads from here.
    pub started_at: Instant,
    pub strikes_remaining: u32,
    /// Scheduled wall-clock deadline task, multiplayer only.
    pub timeout: Option<JoinHandle<()>>,
    /// Set exactly once, on the terminal transition.
    pub winner: Option<UserId>,
}

impl Session {
    pub fn new_multiplayer(
        id: SessionId,
        difficulty: Difficulty,
        start_player: PlayerInfo,
        end_player: PlayerInfo,
        first: ChannelHandle,
        second: ChannelHandle,
    ) -> Self {
        Self {
            id,
            mode: Mode::Multiplayer,
            difficulty,
            start_player,
            end_player,
            status: SessionStatus::Waiting,
            participants: vec![
                Participant {
                    handle: first,
                    ready: false,
                },
                Participant {
                    handle: second,
                    ready: false,
                },
            ],
            started_at: Instant::now(),
            strikes_remaining: difficulty.strike_budget(),
            timeout: None,
            winner: None,
        }
    }

    /// Solo sessions skip the ready phase and start active immediately.
    pub fn new_single(
        id: SessionId,
        difficulty: Difficulty,
        start_player: PlayerInfo,
        end_player: PlayerInfo,
        handle: ChannelHandle,
    ) -> Self {
        Self {
            id,
            mode: Mode::Single,
            difficulty,
            start_player,
            end_player,
            status: SessionStatus::Active,
            participants: vec![Participant {
                handle,
                ready: true,
            }],
            started_at: Instant::now(),
            strikes_remaining: difficulty.strike_budget(),
            timeout: None,
            winner: None,
        }
    }

    pub fn participant(&self, channel: ChannelId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.handle.channel == channel)
    }

    /// The other participant in a multiplayer session.
    pub fn opponent_of(&self, channel: ChannelId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.handle.channel != channel)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.participants
            .iter()
            .map(|p| p.handle.channel)
            .collect()
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .map(|p| p.handle.user.clone())
            .collect()
    }

    /// Mark a participant ready. Only meaningful while waiting.
    pub fn mark_ready(&mut self, channel: ChannelId) -> ReadyOutcome {
        let Some(p) = self
            .participants
            .iter_mut()
            .find(|p| p.handle.channel == channel)
        else {
            return ReadyOutcome::NotParticipant;
        };
        if p.ready {
            return ReadyOutcome::AlreadyReady;
        }
        p.ready = true;
        ReadyOutcome::Marked {
            all_ready: self.participants.iter().all(|p| p.ready),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Apply the terminal transition. The winner is written exactly once;
    /// a pending timeout is canceled idempotently.
    pub fn finish(&mut self, winner: Option<UserId>) {
        self.status = SessionStatus::Finished;
        if self.winner.is_none() {
            self.winner = winner;
        }
        if let Some(handle) = self.timeout.take() {
            handle.abort();
        }
    }

    /// Evaluate the submission validity rules against the session's
    /// endpoints and allowed connection types.
    ///
    /// Rules, in order: length >= 2; first element is the start player;
    /// last element is the end player; every consecutive pair is joined by
    /// at least one edge of an allowed type. Unknown player ids fail rule
    /// four. Infra failures surface as `Err` so the caller can skip the
    /// strike.
    pub fn validate_submission(
        &self,
        graph: &GraphStore,
        path: &[PlayerId],
    ) -> Result<Verdict, GraphError> {
        if path.len() < 2 {
            return Ok(Verdict::Invalid);
        }
        if path[0] != self.start_player.id {
            return Ok(Verdict::Invalid);
        }
        if path[path.len() - 1] != self.end_player.id {
            return Ok(Verdict::Invalid);
        }
        let allowed: &[ConnectionType] = self.difficulty.allowed_types();
        for pair in path.windows(2) {
            if !graph.has_edge(pair[0].as_str(), pair[1].as_str(), allowed)? {
                return Ok(Verdict::Invalid);
            }
        }
        Ok(Verdict::Valid {
            edges: path.len() - 1,
        })
    }
}

/// Solo score: 10000 minus a tenth-of-a-second time penalty minus 100 per
/// edge, floored at zero.
pub fn score(elapsed_secs: f64, edges: usize) -> i64 {
    let time_penalty = (elapsed_secs * 10.0).floor() as i64;
    let hop_penalty = edges as i64 * 100;
    (10_000 - time_penalty - hop_penalty).max(0)
}
