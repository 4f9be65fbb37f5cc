//! # Gridlink Game Server Library
//!
//! Authoritative server for the Gridlink connection racing game. Players
//! are paired by the matchmaker (or start solo sessions) and race to link
//! two endpoint players through the labeled connection graph; the server
//! mediates readiness, live submissions, strikes, timeouts, disconnects,
//! and scoring.
//!
//! ## Module Organization
//!
//! - [`graph`]: read-only snapshot of players and typed connections,
//!   loaded from the database before the server accepts clients.
//! - [`pathfind`]: depth-bounded shortest-path search under a
//!   connection-type filter; used to validate playability at setup and to
//!   surface alternative solutions at game end.
//! - [`endpoints`]: difficulty-tiered start/end pair selection.
//! - [`matchmaker`]: the wait queue pairing clients into games.
//! - [`session`] / [`engine`]: per-session state machine and the engine
//!   that owns every live session, its timers, and all client emissions.
//! - [`network`] / [`auth`]: WebSocket transport and handshake token
//!   verification.
//! - [`stats`]: idempotent win/loss and high-score persistence.
//!
//! ## Architecture
//!
//! The process serves many sessions concurrently; each session is the
//! unit of serialization. The graph snapshot is immutable after startup
//! and shared freely. Only the engine writes frames to clients; every
//! component below it surfaces typed errors upward instead.

pub mod auth;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod graph;
pub mod matchmaker;
pub mod network;
pub mod pathfind;
pub mod session;
pub mod stats;
