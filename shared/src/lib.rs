//! # Shared Game Library
//!
//! Data structures, constants, and the wire protocol shared between the
//! Gridlink game server and its clients. Everything that crosses the
//! WebSocket boundary is defined here so both sides agree on one schema.
//!
//! ## Core Components
//!
//! ### Wire Protocol
//! [`ClientEvent`] and [`ServerEvent`] define the complete event protocol.
//! Events are serialized as JSON text frames with an `event` tag and a
//! `data` payload, matching the message-oriented transport the game client
//! speaks.
//!
//! ### Game Parameters
//! [`Difficulty`] carries the authoritative per-difficulty tuning: which
//! connection types may be traversed, the strike budget, the minimum path
//! length for generated endpoint pairs, and the fantasy-point tier the
//! endpoints are drawn from.
//!
//! ### Identifiers
//! Newtypes for player, user, and session identifiers prevent mixing up
//! the three id spaces across the client-server boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// === Tuning constants ===

/// Maximum search depth of the pathfinder, in hops.
pub const MAX_SEARCH_DEPTH: usize = 5;

/// Maximum number of alternative solution paths surfaced at game end.
pub const SOLUTION_PATH_FANOUT: usize = 3;

/// Attempts the endpoint picker makes before reporting exhaustion.
pub const ENDPOINT_PICK_ATTEMPTS: usize = 50;

/// Minimum candidate pool size before the picker widens the tier.
pub const MIN_TIER_POOL: usize = 10;

/// Pre-match countdown shown to both players, in seconds.
pub const COUNTDOWN_SECS: u64 = 3;

/// Multiplayer wall-clock game duration, in seconds.
pub const GAME_DURATION_SECS: u64 = 60;

// === Identifiers ===

/// Opaque player identifier from the upstream sports data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Verified user identity: the subject of the bearer token presented at
/// the transport handshake. Stable across channels of the same person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Freshly minted unique identifier per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// === Domain enums ===

/// Label of an undirected connection between two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Teammate,
    College,
    DraftClass,
    Position,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teammate => "teammate",
            Self::College => "college",
            Self::DraftClass => "draft_class",
            Self::Position => "position",
        }
    }
}

impl FromStr for ConnectionType {
    type Err = UnknownConnectionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teammate" => Ok(Self::Teammate),
            "college" => Ok(Self::College),
            "draft_class" => Ok(Self::DraftClass),
            "position" => Ok(Self::Position),
            other => Err(UnknownConnectionType(other.to_string())),
        }
    }
}

/// Error for connection-type labels outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownConnectionType(pub String);

impl fmt::Display for UnknownConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown connection type: {}", self.0)
    }
}

impl std::error::Error for UnknownConnectionType {}

/// On-field position of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    Other,
}

impl Position {
    /// Parse an upstream position string; anything outside the four core
    /// positions maps to [`Position::Other`].
    pub fn parse(s: &str) -> Self {
        match s {
            "QB" => Self::Qb,
            "RB" => Self::Rb,
            "WR" => Self::Wr,
            "TE" => Self::Te,
            _ => Self::Other,
        }
    }
}

/// Session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Single,
    Multiplayer,
}

/// Fantasy-point tier an endpoint pool is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Top fantasy tier: peak PPR >= 150.
    Stars,
    /// Mid tier: 75 <= peak PPR < 150.
    Starters,
    /// Any recorded stat line: peak PPR >= 1.
    Recorded,
    /// Every player in the graph.
    Everyone,
}

impl Tier {
    /// Whether a player with the given peak PPR belongs to this tier.
    pub fn contains(&self, peak_ppr: f64) -> bool {
        match self {
            Self::Stars => peak_ppr >= 150.0,
            Self::Starters => (75.0..150.0).contains(&peak_ppr),
            Self::Recorded => peak_ppr >= 1.0,
            Self::Everyone => true,
        }
    }

    /// The next wider pool to fall back to when this one is too small.
    pub fn wider(&self) -> Option<Tier> {
        match self {
            Self::Stars | Self::Starters => Some(Self::Recorded),
            Self::Recorded => Some(Self::Everyone),
            Self::Everyone => None,
        }
    }
}

/// Game difficulty, determining allowed connection types, strike budget,
/// endpoint pool tier, and the minimum hop floor for generated pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Connection types a path may traverse at this difficulty.
    pub fn allowed_types(&self) -> &'static [ConnectionType] {
        match self {
            Self::Easy => &[
                ConnectionType::Teammate,
                ConnectionType::College,
                ConnectionType::DraftClass,
                ConnectionType::Position,
            ],
            Self::Medium => &[ConnectionType::Teammate, ConnectionType::College],
            Self::Hard => &[ConnectionType::Teammate],
        }
    }

    /// Invalid submissions allowed before the game is lost.
    pub fn strike_budget(&self) -> u32 {
        match self {
            Self::Easy => 10,
            Self::Medium => 5,
            Self::Hard => 3,
        }
    }

    /// Minimum edge count of a generated endpoint pair's shortest path.
    pub fn min_hops(&self) -> usize {
        match self {
            Self::Easy => 1,
            Self::Medium | Self::Hard => 2,
        }
    }

    /// Tier the endpoint pool is drawn from.
    pub fn tier(&self) -> Tier {
        match self {
            Self::Easy => Tier::Stars,
            Self::Medium => Tier::Starters,
            Self::Hard => Tier::Recorded,
        }
    }
}

/// Reason attached to a terminal `gameEnd` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    PathFound,
    OutOfStrikes,
    Timeout,
    GaveUp,
    OpponentGaveUp,
    OpponentDisconnected,
    InternalError,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathFound => "path_found",
            Self::OutOfStrikes => "out_of_strikes",
            Self::Timeout => "timeout",
            Self::GaveUp => "gave_up",
            Self::OpponentGaveUp => "opponent_gave_up",
            Self::OpponentDisconnected => "opponent_disconnected",
            Self::InternalError => "internal_error",
        }
    }
}

// === Wire payloads ===

/// Endpoint player data sent in `gameStart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
}

/// Events a client may send to the server.
///
/// Serialized as `{"event": "...", "data": {...}}`; payload-less events
/// omit `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinQueue {
        difficulty: Difficulty,
    },
    LeaveQueue,
    StartSinglePlayerGame {
        difficulty: Difficulty,
    },
    PlayerReady {
        session_id: SessionId,
    },
    SubmitPath {
        session_id: SessionId,
        path: Vec<PlayerId>,
    },
    GiveUp {
        session_id: SessionId,
    },
}

/// Events the server may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    QueueJoined {
        difficulty: Difficulty,
    },
    QueueLeft,
    GameStart {
        session_id: SessionId,
        start_player: PlayerInfo,
        end_player: PlayerInfo,
        mode: Mode,
        difficulty: Difficulty,
        #[serde(skip_serializing_if = "Option::is_none")]
        opponent_user_id: Option<UserId>,
    },
    OpponentReady,
    AllPlayersReady,
    InvalidPath {
        path_length: usize,
        strikes_remaining: u32,
    },
    OpponentAttemptedPath {
        success: bool,
        path_length: usize,
    },
    GameEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_user_id: Option<UserId>,
        reason: EndReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        winning_path: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        solution_paths: Option<Vec<Vec<String>>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
    },
}
