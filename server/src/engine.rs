//! Session engine
//!
//! Owns every live session, enforces the per-session state machine, and
//! is the only component that emits frames to clients. Each session is
//! the unit of serialization: all mutations and emissions for a session
//! happen under its own lock, so no two operations on the same session
//! ever observe interleaved mid-state. The registry locks are held only
//! for lookup and insert/remove.
//!
//! Frames queued to a participant under the session lock are strictly
//! ordered; the terminal `gameEnd` is always the last frame a session
//! sends to a participant, and the session is removed from the registry
//! immediately afterwards. Stats writes (database I/O) run after the
//! session lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use gridlink_shared::{
    Difficulty, EndReason, Mode, PlayerId, PlayerInfo, ServerEvent, SessionId, UserId,
    COUNTDOWN_SECS, GAME_DURATION_SECS, SOLUTION_PATH_FANOUT,
};

use crate::error::GraphError;
use crate::graph::GraphStore;
use crate::matchmaker::PairedMatch;
use crate::pathfind::Pathfinder;
use crate::session::{ReadyOutcome, Session, SessionStatus, Verdict};
use crate::stats::{SessionOutcome, StatsWriter};

/// Identifier of one client connection, assigned by the transport adapter.
pub type ChannelId = u64;

/// Outbound half of a client connection: the verified user identity plus
/// the sender feeding that connection's write loop.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub channel: ChannelId,
    pub user: UserId,
    pub tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelHandle {
    /// Queue a frame for delivery. A closed channel is not an error here;
    /// the disconnect path reaps the session separately.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Engine timing and fan-out parameters. Tests shrink the timers.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Pre-match countdown after both players are ready.
    pub countdown: Duration,
    /// Multiplayer wall-clock game duration.
    pub game_duration: Duration,
    /// Maximum alternative solution paths surfaced at game end.
    pub solution_fanout: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(COUNTDOWN_SECS),
            game_duration: Duration::from_secs(GAME_DURATION_SECS),
            solution_fanout: SOLUTION_PATH_FANOUT,
        }
    }
}

/// Data carried out of the session lock after a terminal transition:
/// what to deregister and what to hand to the stats writer.
struct FinishedSession {
    id: SessionId,
    channels: Vec<ChannelId>,
    outcome: SessionOutcome,
}

/// The process-wide session engine.
pub struct SessionEngine {
    graph: Arc<GraphStore>,
    pathfinder: Pathfinder,
    config: GameConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    by_channel: RwLock<HashMap<ChannelId, SessionId>>,
    stats: Option<Arc<StatsWriter>>,
}

impl SessionEngine {
    pub fn new(
        graph: Arc<GraphStore>,
        config: GameConfig,
        stats: Option<Arc<StatsWriter>>,
    ) -> Self {
        Self {
            pathfinder: Pathfinder::new(graph.clone()),
            graph,
            config,
            sessions: RwLock::new(HashMap::new()),
            by_channel: RwLock::new(HashMap::new()),
            stats,
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Create a multiplayer session from a matched pair. The session
    /// starts in `waiting`; both participants receive `gameStart`.
    pub async fn create_multiplayer(&self, m: PairedMatch) -> SessionId {
        let id = SessionId(Uuid::new_v4().to_string());
        let session = Session::new_multiplayer(
            id.clone(),
            m.difficulty,
            m.start_player,
            m.end_player,
            m.first,
            m.second,
        );
        let arc = Arc::new(Mutex::new(session));
        // Hold the session's own lock across registration and the initial
        // emission. A concurrent disconnect can discover the session the
        // moment it lands in the registries, but it blocks here until
        // gameStart has been queued, so the terminal frame stays last.
        let session = arc.lock().await;
        self.register(&id, &arc, session.channels()).await;
        for p in &session.participants {
            let opponent = session
                .opponent_of(p.handle.channel)
                .map(|o| o.handle.user.clone());
            p.handle.send(ServerEvent::GameStart {
                session_id: id.clone(),
                start_player: session.start_player.clone(),
                end_player: session.end_player.clone(),
                mode: Mode::Multiplayer,
                difficulty: session.difficulty,
                opponent_user_id: opponent,
            });
        }
        info!(
            "session {}: {:?} multiplayer, {} -> {}",
            id, session.difficulty, session.start_player.id, session.end_player.id
        );
        id
    }

    /// Create a single-player session. Starts `active` immediately, no
    /// ready phase and no wall-clock timeout.
    pub async fn create_single(
        &self,
        handle: ChannelHandle,
        difficulty: Difficulty,
        start_player: PlayerInfo,
        end_player: PlayerInfo,
    ) -> SessionId {
        let id = SessionId(Uuid::new_v4().to_string());
        let session = Session::new_single(id.clone(), difficulty, start_player, end_player, handle);
        let arc = Arc::new(Mutex::new(session));
        // Same discipline as create_multiplayer: register while holding
        // the session lock so nothing can finish the session before its
        // gameStart is queued.
        let session = arc.lock().await;
        self.register(&id, &arc, session.channels()).await;
        for p in &session.participants {
            p.handle.send(ServerEvent::GameStart {
                session_id: id.clone(),
                start_player: session.start_player.clone(),
                end_player: session.end_player.clone(),
                mode: Mode::Single,
                difficulty: session.difficulty,
                opponent_user_id: None,
            });
        }
        info!(
            "session {}: {:?} single, {} -> {}",
            id, session.difficulty, session.start_player.id, session.end_player.id
        );
        id
    }

    /// Mark a participant ready. When both are, the session goes active,
    /// the wall-clock deadline is scheduled, and `allPlayersReady` goes
    /// out to both.
    pub async fn ready(self: &Arc<Self>, channel: ChannelId, session_id: &SessionId) {
        let Some(arc) = self.session(session_id).await else {
            return;
        };
        let mut session = arc.lock().await;
        if session.status != SessionStatus::Waiting {
            return;
        }
        match session.mark_ready(channel) {
            ReadyOutcome::NotParticipant => {
                warn!("channel {} sent ready for foreign session {}", channel, session_id);
            }
            ReadyOutcome::AlreadyReady => {}
            ReadyOutcome::Marked { all_ready } => {
                if let Some(opponent) = session.opponent_of(channel) {
                    opponent.handle.send(ServerEvent::OpponentReady);
                }
                if all_ready {
                    session.status = SessionStatus::Active;
                    let deadline = self.config.countdown + self.config.game_duration;
                    let engine = Arc::clone(self);
                    let sid = session.id.clone();
                    session.timeout = Some(tokio::spawn(async move {
                        tokio::time::sleep(deadline).await;
                        engine.handle_timeout(&sid).await;
                    }));
                    for p in &session.participants {
                        p.handle.send(ServerEvent::AllPlayersReady);
                    }
                    info!("session {} active", session.id);
                }
            }
        }
    }

    /// Evaluate a path submission.
    pub async fn submit_path(
        &self,
        channel: ChannelId,
        session_id: &SessionId,
        path: Vec<PlayerId>,
    ) {
        let Some(arc) = self.session(session_id).await else {
            return;
        };
        let finished = {
            let mut session = arc.lock().await;
            if session.status != SessionStatus::Active {
                return;
            }
            if session.participant(channel).is_none() {
                warn!(
                    "channel {} submitted to foreign session {}",
                    channel, session_id
                );
                return;
            }
            match session.validate_submission(&self.graph, &path) {
                Err(e @ GraphError::SnapshotUnavailable) => {
                    // The adjacency cache is gone; the session cannot
                    // continue.
                    error!("session {}: {}", session.id, e);
                    Some(self.fail_session(&mut session))
                }
                Err(e) => {
                    // Transient infra: no strike, no state change.
                    error!(
                        "session {}: submission validation failed: {}",
                        session.id, e
                    );
                    return;
                }
                Ok(Verdict::Valid { edges }) => {
                    self.finish_with_win(&mut session, channel, &path, edges)
                }
                Ok(Verdict::Invalid) => self.apply_strike(&mut session, channel, path.len()),
            }
        };
        self.finalize(finished).await;
    }

    /// Concede the game.
    pub async fn give_up(&self, channel: ChannelId, session_id: &SessionId) {
        let Some(arc) = self.session(session_id).await else {
            return;
        };
        let finished = {
            let mut session = arc.lock().await;
            if session.status != SessionStatus::Active {
                return;
            }
            if session.participant(channel).is_none() {
                warn!("channel {} gave up foreign session {}", channel, session_id);
                return;
            }
            match session.mode {
                Mode::Single => {
                    session.finish(None);
                    for p in &session.participants {
                        p.handle.send(terminal_frame(None, EndReason::GaveUp));
                    }
                    Some(self.finished(&session, None))
                }
                Mode::Multiplayer => match session.opponent_of(channel) {
                    None => Some(self.fail_session(&mut session)),
                    Some(opponent) => {
                        let winner = opponent.handle.user.clone();
                        let opponent_handle = opponent.handle.clone();
                        session.finish(Some(winner.clone()));
                        if let Some(giver) = session.participant(channel) {
                            giver
                                .handle
                                .send(terminal_frame(Some(winner.clone()), EndReason::GaveUp));
                        }
                        opponent_handle
                            .send(terminal_frame(Some(winner), EndReason::OpponentGaveUp));
                        info!("session {}: channel {} gave up", session.id, channel);
                        Some(self.finished(&session, None))
                    }
                },
            }
        };
        self.finalize(finished).await;
    }

    /// Handle a closed channel. Multiplayer sessions end in favor of the
    /// remaining participant; solo sessions are destroyed silently.
    pub async fn disconnect(&self, channel: ChannelId) {
        let session_id = { self.by_channel.read().await.get(&channel).cloned() };
        let Some(session_id) = session_id else {
            return;
        };
        let Some(arc) = self.session(&session_id).await else {
            self.by_channel.write().await.remove(&channel);
            return;
        };
        let finished = {
            let mut session = arc.lock().await;
            if session.status == SessionStatus::Finished {
                None
            } else {
                match session.mode {
                    Mode::Single => {
                        session.finish(None);
                        info!("session {}: solo player disconnected", session.id);
                        Some(self.finished(&session, None))
                    }
                    Mode::Multiplayer => match session.opponent_of(channel) {
                        None => Some(self.fail_session(&mut session)),
                        Some(opponent) => {
                            let winner = opponent.handle.user.clone();
                            let opponent_handle = opponent.handle.clone();
                            session.finish(Some(winner.clone()));
                            opponent_handle.send(terminal_frame(
                                Some(winner),
                                EndReason::OpponentDisconnected,
                            ));
                            info!(
                                "session {}: channel {} disconnected",
                                session.id, channel
                            );
                            Some(self.finished(&session, None))
                        }
                    },
                }
            }
        };
        self.finalize(finished).await;
    }

    /// Wall-clock deadline: no winner, solutions to both participants.
    /// A no-op unless the session is still active.
    pub async fn handle_timeout(&self, session_id: &SessionId) {
        let Some(arc) = self.session(session_id).await else {
            return;
        };
        let finished = {
            let mut session = arc.lock().await;
            if session.status != SessionStatus::Active {
                return;
            }
            session.finish(None);
            let solutions = self.solution_paths(&session, None);
            for p in &session.participants {
                p.handle.send(ServerEvent::GameEnd {
                    winner_user_id: None,
                    reason: EndReason::Timeout,
                    winning_path: None,
                    solution_paths: Some(solutions.clone()),
                    score: None,
                    time: None,
                });
            }
            info!("session {} timed out", session.id);
            Some(self.finished(&session, None))
        };
        self.finalize(finished).await;
    }

    /// Terminal emission for every live session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.write().await;
            map.drain().collect()
        };
        self.by_channel.write().await.clear();
        for (_, arc) in sessions {
            let mut session = arc.lock().await;
            if session.status == SessionStatus::Finished {
                continue;
            }
            session.finish(None);
            for p in &session.participants {
                p.handle
                    .send(terminal_frame(None, EndReason::InternalError));
            }
        }
        info!("engine shut down");
    }

    // === internals ===

    /// Make a session discoverable. Callers hold the session's own lock,
    /// so lookups that race this registration serialize behind the
    /// creation path's initial emission.
    async fn register(&self, id: &SessionId, arc: &Arc<Mutex<Session>>, channels: Vec<ChannelId>) {
        self.sessions.write().await.insert(id.clone(), arc.clone());
        let mut by_channel = self.by_channel.write().await;
        for channel in channels {
            by_channel.insert(channel, id.clone());
        }
    }

    async fn session(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Valid submission: terminal transition in favor of the submitter.
    fn finish_with_win(
        &self,
        session: &mut Session,
        channel: ChannelId,
        path: &[PlayerId],
        edges: usize,
    ) -> Option<FinishedSession> {
        let winner = session.participant(channel)?.handle.user.clone();
        session.finish(Some(winner.clone()));
        let names = self.graph.display_names(path);

        match session.mode {
            Mode::Multiplayer => {
                if let Some(submitter) = session.participant(channel) {
                    submitter.handle.send(ServerEvent::GameEnd {
                        winner_user_id: Some(winner.clone()),
                        reason: EndReason::PathFound,
                        winning_path: Some(names.clone()),
                        solution_paths: None,
                        score: None,
                        time: None,
                    });
                }
                if let Some(opponent) = session.opponent_of(channel) {
                    let solutions = self.solution_paths(session, Some(names.as_slice()));
                    opponent.handle.send(ServerEvent::GameEnd {
                        winner_user_id: Some(winner.clone()),
                        reason: EndReason::PathFound,
                        winning_path: Some(names),
                        solution_paths: Some(solutions),
                        score: None,
                        time: None,
                    });
                }
                info!("session {}: won by {} in {} hops", session.id, winner, edges);
                Some(self.finished(session, None))
            }
            Mode::Single => {
                let elapsed = session.elapsed_secs();
                let score = crate::session::score(elapsed, edges);
                if let Some(p) = session.participant(channel) {
                    p.handle.send(ServerEvent::GameEnd {
                        winner_user_id: Some(winner.clone()),
                        reason: EndReason::PathFound,
                        winning_path: Some(names),
                        solution_paths: None,
                        score: Some(score),
                        time: Some(elapsed),
                    });
                }
                info!(
                    "session {}: solved solo in {:.1}s for {} points",
                    session.id, elapsed, score
                );
                Some(self.finished(session, Some(score)))
            }
        }
    }

    /// Invalid submission: strike accounting, possibly terminal.
    fn apply_strike(
        &self,
        session: &mut Session,
        channel: ChannelId,
        path_length: usize,
    ) -> Option<FinishedSession> {
        session.strikes_remaining = session.strikes_remaining.saturating_sub(1);
        let strikes = session.strikes_remaining;

        if let Some(submitter) = session.participant(channel) {
            submitter.handle.send(ServerEvent::InvalidPath {
                path_length,
                strikes_remaining: strikes,
            });
        }
        if session.mode == Mode::Multiplayer {
            if let Some(opponent) = session.opponent_of(channel) {
                opponent.handle.send(ServerEvent::OpponentAttemptedPath {
                    success: false,
                    path_length,
                });
            }
        }
        if strikes > 0 {
            return None;
        }

        match session.mode {
            Mode::Multiplayer => {
                let winner = session
                    .opponent_of(channel)
                    .map(|o| o.handle.user.clone());
                let Some(winner) = winner else {
                    return Some(self.fail_session(session));
                };
                session.finish(Some(winner.clone()));
                for p in &session.participants {
                    p.handle
                        .send(terminal_frame(Some(winner.clone()), EndReason::OutOfStrikes));
                }
                info!("session {}: out of strikes, {} wins", session.id, winner);
            }
            Mode::Single => {
                session.finish(None);
                for p in &session.participants {
                    p.handle.send(terminal_frame(None, EndReason::OutOfStrikes));
                }
                info!("session {}: out of strikes", session.id);
            }
        }
        Some(self.finished(session, None))
    }

    /// Impossible-state fallback: terminate with `internal_error`.
    fn fail_session(&self, session: &mut Session) -> FinishedSession {
        error!("session {}: lost invariant, terminating", session.id);
        session.finish(None);
        for p in &session.participants {
            p.handle
                .send(terminal_frame(None, EndReason::InternalError));
        }
        self.finished(session, None)
    }

    /// Up to `solution_fanout` shortest solution paths as display-name
    /// sequences, deduplicated after name mapping, excluding the winning
    /// sequence when one exists.
    fn solution_paths(&self, session: &Session, exclude: Option<&[String]>) -> Vec<Vec<String>> {
        let k = self.config.solution_fanout;
        let raw = self.pathfinder.shortest_paths(
            &session.start_player.id,
            &session.end_player.id,
            session.difficulty.allowed_types(),
            k + 1,
        );
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut out = Vec::new();
        for path in raw {
            let names = self.graph.display_names(&path);
            if exclude.is_some_and(|ex| ex == names.as_slice()) {
                continue;
            }
            if seen.insert(names.clone()) {
                out.push(names);
            }
            if out.len() == k {
                break;
            }
        }
        out
    }

    fn finished(&self, session: &Session, score: Option<i64>) -> FinishedSession {
        FinishedSession {
            id: session.id.clone(),
            channels: session.channels(),
            outcome: SessionOutcome {
                session_id: session.id.clone(),
                mode: session.mode,
                difficulty: session.difficulty,
                participants: session.user_ids(),
                winner: session.winner.clone(),
                score,
            },
        }
    }

    /// Deregister a finished session and hand its outcome to the stats
    /// writer. Runs outside the session lock.
    async fn finalize(&self, finished: Option<FinishedSession>) {
        let Some(finished) = finished else {
            return;
        };
        self.sessions.write().await.remove(&finished.id);
        {
            let mut by_channel = self.by_channel.write().await;
            for channel in &finished.channels {
                by_channel.remove(channel);
            }
        }
        if let Some(stats) = &self.stats {
            stats.record(&finished.outcome).await;
        }
    }
}

fn terminal_frame(winner: Option<UserId>, reason: EndReason) -> ServerEvent {
    ServerEvent::GameEnd {
        winner_user_id: winner,
        reason,
        winning_path: None,
        solution_paths: None,
        score: None,
        time: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Player;
    use crate::matchmaker::PairedMatch;
    use gridlink_shared::{ConnectionType, Position};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn player(id: &str) -> Player {
        Player {
            id: PlayerId::from(id),
            name: id.to_uppercase(),
            position: Position::Te,
            college: None,
            draft_year: None,
            peak_ppr: 0.0,
        }
    }

    fn teammate(a: &str, b: &str) -> (PlayerId, PlayerId, ConnectionType) {
        (PlayerId::from(a), PlayerId::from(b), ConnectionType::Teammate)
    }

    /// x to y through three parallel 2-hop teammate chains.
    fn graph() -> Arc<GraphStore> {
        Arc::new(GraphStore::from_parts(
            ["x", "y", "m1", "m2", "m3"].map(player).to_vec(),
            vec![
                teammate("x", "m1"),
                teammate("m1", "y"),
                teammate("x", "m2"),
                teammate("m2", "y"),
                teammate("x", "m3"),
                teammate("m3", "y"),
            ],
        ))
    }

    fn test_engine() -> Arc<SessionEngine> {
        Arc::new(SessionEngine::new(graph(), GameConfig::default(), None))
    }

    fn channel(id: ChannelId) -> (ChannelHandle, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChannelHandle {
                channel: id,
                user: UserId(format!("user-{}", id)),
                tx,
            },
            rx,
        )
    }

    fn endpoints(engine: &SessionEngine) -> (PlayerInfo, PlayerInfo) {
        let x = engine.graph.node("x").unwrap();
        let y = engine.graph.node("y").unwrap();
        (engine.graph.info(x), engine.graph.info(y))
    }

    fn paired(engine: &SessionEngine, a: ChannelHandle, b: ChannelHandle) -> PairedMatch {
        let (start_player, end_player) = endpoints(engine);
        PairedMatch {
            difficulty: Difficulty::Hard,
            start_player,
            end_player,
            first: a,
            second: b,
        }
    }

    #[tokio::test]
    async fn test_create_registers_session_and_channels() {
        let engine = test_engine();
        let (a, mut rxa) = channel(1);
        let (b, _rxb) = channel(2);
        let sid = engine.create_multiplayer(paired(&engine, a, b)).await;
        assert_eq!(engine.session_count().await, 1);
        assert!(engine.session(&sid).await.is_some());
        assert!(matches!(
            rxa.try_recv().unwrap(),
            ServerEvent::GameStart { .. }
        ));
    }

    #[tokio::test]
    async fn test_ready_from_foreign_channel_is_ignored() {
        let engine = test_engine();
        let (a, _rxa) = channel(1);
        let (b, mut rxb) = channel(2);
        let sid = engine.create_multiplayer(paired(&engine, a, b)).await;
        let _ = rxb.try_recv();

        engine.ready(99, &sid).await;
        assert!(rxb.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_solution_paths_deduplicate_and_exclude_winner() {
        let engine = test_engine();
        let (a, _rxa) = channel(1);
        let (b, _rxb) = channel(2);
        let sid = engine.create_multiplayer(paired(&engine, a, b)).await;
        let arc = engine.session(&sid).await.unwrap();
        let session = arc.lock().await;

        let all = engine.solution_paths(&session, None);
        assert_eq!(all.len(), 3);
        let mut unique: Vec<_> = all.clone();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        // Excluding the winning sequence leaves the other chains.
        let winning = all[0].clone();
        let rest = engine.solution_paths(&session, Some(winning.as_slice()));
        assert!(!rest.contains(&winning));
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_emits_internal_error_to_live_sessions() {
        let engine = test_engine();
        let (a, mut rxa) = channel(1);
        let (b, mut rxb) = channel(2);
        engine.create_multiplayer(paired(&engine, a, b)).await;
        let _ = rxa.try_recv();
        let _ = rxb.try_recv();

        engine.shutdown().await;
        assert_eq!(engine.session_count().await, 0);
        for rx in [&mut rxa, &mut rxb] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                ServerEvent::GameEnd {
                    winner_user_id: None,
                    reason: EndReason::InternalError,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_disconnect_of_unknown_channel_is_a_noop() {
        let engine = test_engine();
        engine.disconnect(42).await;
        assert_eq!(engine.session_count().await, 0);
    }
}
