//! Win/loss and high-score persistence
//!
//! The write path for session outcomes. Idempotent per session: the
//! engine may hand the same outcome over more than once (e.g. a retried
//! finalize), and re-invocations must not double-count. Write failures
//! are logged and swallowed; stats are best-effort and never surface to
//! the transport.

use std::collections::HashSet;
use std::sync::Mutex;

use log::{error, info};
use sqlx::PgPool;

use gridlink_shared::{Difficulty, Mode, SessionId, UserId};

/// Terminal outcome of one session, as handed over by the engine.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub participants: Vec<UserId>,
    pub winner: Option<UserId>,
    /// Single-player final score, when the game was solved.
    pub score: Option<i64>,
}

/// Tracks which sessions have already been written.
#[derive(Debug, Default)]
pub struct RecordedSet {
    seen: Mutex<HashSet<SessionId>>,
}

impl RecordedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a session id is seen.
    pub fn mark(&self, id: &SessionId) -> bool {
        self.seen.lock().unwrap().insert(id.clone())
    }
}

/// Idempotent writer for `user_stats`.
pub struct StatsWriter {
    pool: PgPool,
    recorded: RecordedSet,
}

impl StatsWriter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            recorded: RecordedSet::new(),
        }
    }

    /// Persist a session outcome. A repeat invocation for the same
    /// session id is a no-op. Sessions without a winner write nothing.
    pub async fn record(&self, outcome: &SessionOutcome) {
        if !self.recorded.mark(&outcome.session_id) {
            return;
        }
        match outcome.mode {
            Mode::Single => self.record_single(outcome).await,
            Mode::Multiplayer => self.record_multiplayer(outcome).await,
        }
    }

    async fn record_single(&self, outcome: &SessionOutcome) {
        let (Some(winner), Some(score)) = (&outcome.winner, outcome.score) else {
            return;
        };
        let result = sqlx::query(
            "INSERT INTO user_stats (user_id, single_player_high_score) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET single_player_high_score = \
             GREATEST(user_stats.single_player_high_score, EXCLUDED.single_player_high_score)",
        )
        .bind(winner.as_str())
        .bind(score)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => info!(
                "recorded solo score {} for {} (session {})",
                score, winner, outcome.session_id
            ),
            Err(e) => error!(
                "failed to record solo score for session {}: {}",
                outcome.session_id, e
            ),
        }
    }

    async fn record_multiplayer(&self, outcome: &SessionOutcome) {
        let Some(winner) = &outcome.winner else {
            // Timed-out games have no winner and no stat line.
            return;
        };
        for user in &outcome.participants {
            let won = user == winner;
            let result = if won {
                sqlx::query(
                    "INSERT INTO user_stats (user_id, multiplayer_wins) VALUES ($1, 1) \
                     ON CONFLICT (user_id) DO UPDATE SET multiplayer_wins = \
                     user_stats.multiplayer_wins + 1",
                )
                .bind(user.as_str())
                .execute(&self.pool)
                .await
            } else {
                sqlx::query(
                    "INSERT INTO user_stats (user_id, multiplayer_losses) VALUES ($1, 1) \
                     ON CONFLICT (user_id) DO UPDATE SET multiplayer_losses = \
                     user_stats.multiplayer_losses + 1",
                )
                .bind(user.as_str())
                .execute(&self.pool)
                .await
            };
            if let Err(e) = result {
                error!(
                    "failed to record {} for {} (session {}): {}",
                    if won { "win" } else { "loss" },
                    user,
                    outcome.session_id,
                    e
                );
            }
        }
        info!(
            "recorded multiplayer outcome for session {} (winner {})",
            outcome.session_id, winner
        );
    }
}
