//! Read-only player connection graph
//!
//! This module holds the in-memory snapshot of players and their labeled
//! connections. The snapshot is loaded from the database once at startup,
//! before the server accepts clients, and is immutable afterwards; reloads
//! are restart-scoped.
//!
//! Player ids are opaque strings on the wire. Internally they are interned
//! to dense `u32` node indices so that adjacency storage and the
//! pathfinder's bookkeeping stay compact on a graph of thousands of nodes
//! and hundreds of thousands of edges.

use std::collections::{HashMap, HashSet};

use log::{info, warn};
use sqlx::{FromRow, PgPool};

use gridlink_shared::{ConnectionType, PlayerId, PlayerInfo, Position, Tier};

use crate::error::GraphError;

/// Dense node index assigned to each player at load time.
pub type NodeIx = u32;

/// A player record, immutable for the lifetime of the snapshot.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub college: Option<String>,
    pub draft_year: Option<i32>,
    /// Best seasonal PPR total on record; 0.0 when no stat line exists.
    /// Used only for endpoint tiering.
    pub peak_ppr: f64,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    to: NodeIx,
    kind: ConnectionType,
}

/// Immutable adjacency snapshot over players and typed connections.
///
/// Neighbor iteration yields each (neighbor, type) pair once, in load
/// order, which keeps downstream path enumeration deterministic for a
/// given snapshot.
pub struct GraphStore {
    players: Vec<Player>,
    index: HashMap<String, NodeIx>,
    adj: Vec<Vec<Edge>>,
    edge_count: usize,
}

#[derive(FromRow)]
struct PlayerRow {
    id: String,
    name: String,
    position: Option<String>,
    college: Option<String>,
    draft_year: Option<i32>,
}

#[derive(FromRow)]
struct PeakPprRow {
    player_id: String,
    peak_ppr: Option<f64>,
}

#[derive(FromRow)]
struct ConnectionRow {
    player1_id: String,
    player2_id: String,
    connection_type: String,
}

impl GraphStore {
    /// Load the full snapshot from the database.
    ///
    /// Must complete before the server accepts clients; every later read
    /// is served from memory.
    pub async fn load(pool: &PgPool) -> Result<Self, GraphError> {
        let player_rows: Vec<PlayerRow> =
            sqlx::query_as("SELECT id, name, position, college, draft_year FROM players")
                .fetch_all(pool)
                .await?;

        let ppr_rows: Vec<PeakPprRow> = sqlx::query_as(
            "SELECT player_id, MAX(fantasy_points_ppr)::float8 AS peak_ppr \
             FROM player_seasonal_stats GROUP BY player_id",
        )
        .fetch_all(pool)
        .await?;

        let connection_rows: Vec<ConnectionRow> = sqlx::query_as(
            "SELECT player1_id, player2_id, connection_type FROM player_connections",
        )
        .fetch_all(pool)
        .await?;

        let mut peak: HashMap<String, f64> = HashMap::with_capacity(ppr_rows.len());
        for row in ppr_rows {
            peak.insert(row.player_id, row.peak_ppr.unwrap_or(0.0));
        }

        let players: Vec<Player> = player_rows
            .into_iter()
            .map(|row| Player {
                peak_ppr: peak.get(&row.id).copied().unwrap_or(0.0),
                id: PlayerId(row.id),
                name: row.name,
                position: row.position.as_deref().map(Position::parse).unwrap_or(Position::Other),
                college: row.college,
                draft_year: row.draft_year,
            })
            .collect();

        let connections = connection_rows.into_iter().filter_map(|row| {
            match row.connection_type.parse::<ConnectionType>() {
                Ok(kind) => Some((PlayerId(row.player1_id), PlayerId(row.player2_id), kind)),
                Err(e) => {
                    warn!(
                        "skipping connection {} - {}: {}",
                        row.player1_id, row.player2_id, e
                    );
                    None
                }
            }
        });

        let store = Self::from_parts(players, connections);
        info!(
            "graph snapshot loaded: {} players, {} connections",
            store.player_count(),
            store.edge_count()
        );
        Ok(store)
    }

    /// Build a snapshot from in-memory rows.
    ///
    /// Self-loops and connections referencing unknown players are dropped
    /// with a warning; duplicate (pair, type) triples collapse to one edge.
    pub fn from_parts(
        players: Vec<Player>,
        connections: impl IntoIterator<Item = (PlayerId, PlayerId, ConnectionType)>,
    ) -> Self {
        let mut index = HashMap::with_capacity(players.len());
        for (ix, player) in players.iter().enumerate() {
            index.insert(player.id.0.clone(), ix as NodeIx);
        }

        let mut adj: Vec<Vec<Edge>> = vec![Vec::new(); players.len()];
        let mut seen: HashSet<(NodeIx, NodeIx, ConnectionType)> = HashSet::new();
        let mut edge_count = 0usize;

        for (a, b, kind) in connections {
            let (Some(&na), Some(&nb)) = (index.get(a.as_str()), index.get(b.as_str())) else {
                warn!("skipping connection {} - {}: unknown player", a, b);
                continue;
            };
            if na == nb {
                warn!("skipping self-loop on {}", a);
                continue;
            }
            let key = (na.min(nb), na.max(nb), kind);
            if !seen.insert(key) {
                continue;
            }
            adj[na as usize].push(Edge { to: nb, kind });
            adj[nb as usize].push(Edge { to: na, kind });
            edge_count += 1;
        }

        Self {
            players,
            index,
            adj,
            edge_count,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Look up the node index for a player id.
    pub fn node(&self, id: &str) -> Option<NodeIx> {
        self.index.get(id).copied()
    }

    /// Look up a player record by id.
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.node(id).map(|ix| &self.players[ix as usize])
    }

    /// Player record at a node index. Indices only come from this store,
    /// so the lookup is infallible.
    pub fn player_at(&self, node: NodeIx) -> &Player {
        &self.players[node as usize]
    }

    /// Wire-facing endpoint info for a node.
    pub fn info(&self, node: NodeIx) -> PlayerInfo {
        let player = self.player_at(node);
        PlayerInfo {
            id: player.id.clone(),
            name: player.name.clone(),
            position: player.position,
        }
    }

    /// Neighbors of `node` reachable over an edge whose type is in
    /// `allowed`. Each (neighbor, type) pair is yielded once.
    pub fn neighbors<'a>(
        &'a self,
        node: NodeIx,
        allowed: &'a [ConnectionType],
    ) -> impl Iterator<Item = (NodeIx, ConnectionType)> + 'a {
        self.adj[node as usize]
            .iter()
            .filter(move |edge| allowed.contains(&edge.kind))
            .map(|edge| (edge.to, edge.kind))
    }

    /// Whether any edge of an allowed type connects `a` and `b`.
    ///
    /// Unknown ids read as unconnected. The `Result` carries infra
    /// failures so callers can apply the no-strike rule; the in-memory
    /// snapshot itself only fails when it was never populated.
    pub fn has_edge(
        &self,
        a: &str,
        b: &str,
        allowed: &[ConnectionType],
    ) -> Result<bool, GraphError> {
        if self.players.is_empty() {
            return Err(GraphError::SnapshotUnavailable);
        }
        let (Some(na), Some(nb)) = (self.node(a), self.node(b)) else {
            return Ok(false);
        };
        Ok(self.neighbors(na, allowed).any(|(to, _)| to == nb))
    }

    /// Node indices of every player in the given tier.
    pub fn tier_pool(&self, tier: Tier) -> Vec<NodeIx> {
        self.players
            .iter()
            .enumerate()
            .filter(|(_, p)| tier.contains(p.peak_ppr))
            .map(|(ix, _)| ix as NodeIx)
            .collect()
    }

    /// Map a node-id path to display names, in order.
    pub fn display_names(&self, path: &[PlayerId]) -> Vec<String> {
        path.iter()
            .map(|id| {
                self.player(id.as_str())
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| id.0.clone())
            })
            .collect()
    }
}
