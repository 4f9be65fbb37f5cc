//! Constrained shortest-path search over the connection graph
//!
//! Breadth-first search from the start player, expanding only edges whose
//! type is in the session's allowed set, bounded at [`MAX_SEARCH_DEPTH`]
//! hops. The forward pass labels every reachable node with its distance
//! and records shortest-path predecessors; path enumeration then walks the
//! predecessor DAG backwards from the end node, so no path can revisit a
//! node (distances strictly decrease along it) and enumeration stops as
//! soon as the requested number of paths is collected.
//!
//! Enumeration order follows the snapshot's adjacency order, making
//! results deterministic for a given graph load.

use std::collections::VecDeque;

use log::debug;
use std::sync::Arc;

use gridlink_shared::{ConnectionType, PlayerId, MAX_SEARCH_DEPTH};

use crate::graph::{GraphStore, NodeIx};

const UNVISITED: u32 = u32::MAX;

/// Shortest-path search over a [`GraphStore`] snapshot.
///
/// Stateless for callers; may be shared across any number of tasks.
pub struct Pathfinder {
    graph: Arc<GraphStore>,
    max_depth: usize,
}

impl Pathfinder {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self {
            graph,
            max_depth: MAX_SEARCH_DEPTH,
        }
    }

    /// One shortest path from `start` to `end` under the type filter, as a
    /// node-id sequence including both endpoints. Empty when no path
    /// exists within the hop bound or either endpoint is unknown.
    pub fn shortest_path(
        &self,
        start: &PlayerId,
        end: &PlayerId,
        allowed: &[ConnectionType],
    ) -> Vec<PlayerId> {
        self.shortest_paths(start, end, allowed, 1)
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Up to `k` distinct shortest paths, all of the minimum length.
    pub fn shortest_paths(
        &self,
        start: &PlayerId,
        end: &PlayerId,
        allowed: &[ConnectionType],
        k: usize,
    ) -> Vec<Vec<PlayerId>> {
        if k == 0 {
            return Vec::new();
        }
        let (Some(s), Some(e)) = (
            self.graph.node(start.as_str()),
            self.graph.node(end.as_str()),
        ) else {
            return Vec::new();
        };
        if s == e {
            return vec![vec![start.clone()]];
        }

        let n = self.graph.player_count();
        let mut dist: Vec<u32> = vec![UNVISITED; n];
        let mut preds: Vec<Vec<NodeIx>> = vec![Vec::new(); n];
        let mut queue: VecDeque<NodeIx> = VecDeque::new();

        dist[s as usize] = 0;
        queue.push_back(s);
        let mut found_dist: Option<u32> = None;

        while let Some(u) = queue.pop_front() {
            let du = dist[u as usize];
            // Nothing past the hop bound, and nothing past the first
            // level at which the end node was discovered.
            if du as usize >= self.max_depth {
                continue;
            }
            if let Some(fd) = found_dist {
                if du + 1 > fd {
                    break;
                }
            }
            for (v, _) in self.graph.neighbors(u, allowed) {
                let dv = &mut dist[v as usize];
                if *dv == UNVISITED {
                    *dv = du + 1;
                    preds[v as usize].push(u);
                    if v == e {
                        found_dist = Some(du + 1);
                    } else {
                        queue.push_back(v);
                    }
                } else if *dv == du + 1 && !preds[v as usize].contains(&u) {
                    // Another shortest route into v; parallel edge types
                    // between the same pair are collapsed here.
                    preds[v as usize].push(u);
                }
            }
        }

        let Some(found) = found_dist else {
            return Vec::new();
        };
        debug!(
            "shortest path {} -> {}: {} hops",
            start, end, found
        );

        let mut paths: Vec<Vec<NodeIx>> = Vec::new();
        let mut current: Vec<NodeIx> = Vec::with_capacity(found as usize + 1);
        self.collect_paths(&preds, e, s, &mut current, &mut paths, k);

        paths
            .into_iter()
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|ix| self.graph.player_at(ix).id.clone())
                    .collect()
            })
            .collect()
    }

    /// Walk the predecessor DAG from `node` back to `root`, emitting
    /// forward-ordered paths until `cap` are collected.
    fn collect_paths(
        &self,
        preds: &[Vec<NodeIx>],
        node: NodeIx,
        root: NodeIx,
        current: &mut Vec<NodeIx>,
        out: &mut Vec<Vec<NodeIx>>,
        cap: usize,
    ) {
        if out.len() >= cap {
            return;
        }
        current.push(node);
        if node == root {
            let mut path = current.clone();
            path.reverse();
            out.push(path);
        } else {
            for &p in &preds[node as usize] {
                if out.len() >= cap {
                    break;
                }
                self.collect_paths(preds, p, root, current, out, cap);
            }
        }
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Player;
    use gridlink_shared::Position;

    fn player(id: &str) -> Player {
        Player {
            id: PlayerId::from(id),
            name: id.to_uppercase(),
            position: Position::Other,
            college: None,
            draft_year: None,
            peak_ppr: 0.0,
        }
    }

    fn teammate(a: &str, b: &str) -> (PlayerId, PlayerId, ConnectionType) {
        (PlayerId::from(a), PlayerId::from(b), ConnectionType::Teammate)
    }

    fn ids(raw: &[&str]) -> Vec<PlayerId> {
        raw.iter().map(|s| PlayerId::from(*s)).collect()
    }

    /// Diamond: a-b-d and a-c-d, plus a long detour a-e-f-d.
    fn diamond() -> Arc<GraphStore> {
        Arc::new(GraphStore::from_parts(
            ["a", "b", "c", "d", "e", "f"].map(player).to_vec(),
            vec![
                teammate("a", "b"),
                teammate("b", "d"),
                teammate("a", "c"),
                teammate("c", "d"),
                teammate("a", "e"),
                teammate("e", "f"),
                teammate("f", "d"),
            ],
        ))
    }

    #[test]
    fn test_shortest_path_basic() {
        let pf = Pathfinder::new(diamond());
        let path = pf.shortest_path(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
        );
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], PlayerId::from("a"));
        assert_eq!(path[2], PlayerId::from("d"));
    }

    #[test]
    fn test_all_enumerated_paths_are_minimum_length() {
        let pf = Pathfinder::new(diamond());
        let paths = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
            10,
        );
        // The 3-hop detour through e,f must not appear.
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert_eq!(path.len(), 3);
        }
        // Distinct middles.
        assert_ne!(paths[0][1], paths[1][1]);
    }

    #[test]
    fn test_k_caps_enumeration() {
        let pf = Pathfinder::new(diamond());
        let paths = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
            1,
        );
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_no_repeated_nodes_within_a_path() {
        // Cycle-rich graph: triangle a-b-c plus b-d.
        let store = Arc::new(GraphStore::from_parts(
            ["a", "b", "c", "d"].map(player).to_vec(),
            vec![
                teammate("a", "b"),
                teammate("b", "c"),
                teammate("c", "a"),
                teammate("b", "d"),
            ],
        ));
        let pf = Pathfinder::new(store);
        let paths = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
            10,
        );
        for path in &paths {
            let mut seen = std::collections::HashSet::new();
            assert!(path.iter().all(|id| seen.insert(id.clone())));
        }
    }

    #[test]
    fn test_depth_bound() {
        // Chain of 7 nodes = 6 hops end to end, one over the bound.
        let store = Arc::new(GraphStore::from_parts(
            ["n0", "n1", "n2", "n3", "n4", "n5", "n6"].map(player).to_vec(),
            vec![
                teammate("n0", "n1"),
                teammate("n1", "n2"),
                teammate("n2", "n3"),
                teammate("n3", "n4"),
                teammate("n4", "n5"),
                teammate("n5", "n6"),
            ],
        ));
        let pf = Pathfinder::new(store.clone());
        assert!(pf
            .shortest_path(
                &PlayerId::from("n0"),
                &PlayerId::from("n6"),
                &[ConnectionType::Teammate],
            )
            .is_empty());
        // Exactly at the bound is still reachable.
        let at_bound = pf.shortest_path(
            &PlayerId::from("n0"),
            &PlayerId::from("n5"),
            &[ConnectionType::Teammate],
        );
        assert_eq!(at_bound.len(), 6);
    }

    #[test]
    fn test_type_filter_changes_reachability() {
        let store = Arc::new(GraphStore::from_parts(
            ["a", "b", "c"].map(player).to_vec(),
            vec![
                teammate("a", "b"),
                (
                    PlayerId::from("b"),
                    PlayerId::from("c"),
                    ConnectionType::DraftClass,
                ),
            ],
        ));
        let pf = Pathfinder::new(store);
        let a = PlayerId::from("a");
        let c = PlayerId::from("c");

        assert!(pf
            .shortest_path(&a, &c, &[ConnectionType::Teammate])
            .is_empty());
        let both = pf.shortest_path(
            &a,
            &c,
            &[ConnectionType::Teammate, ConnectionType::DraftClass],
        );
        assert_eq!(both, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_start_equals_end() {
        let pf = Pathfinder::new(diamond());
        let a = PlayerId::from("a");
        assert_eq!(
            pf.shortest_path(&a, &a, &[ConnectionType::Teammate]),
            ids(&["a"])
        );
        assert_eq!(
            pf.shortest_paths(&a, &a, &[ConnectionType::Teammate], 5),
            vec![ids(&["a"])]
        );
    }

    #[test]
    fn test_unknown_endpoint_is_unreachable() {
        let pf = Pathfinder::new(diamond());
        assert!(pf
            .shortest_path(
                &PlayerId::from("a"),
                &PlayerId::from("ghost"),
                &[ConnectionType::Teammate],
            )
            .is_empty());
        assert!(pf
            .shortest_paths(
                &PlayerId::from("ghost"),
                &PlayerId::from("a"),
                &[ConnectionType::Teammate],
                3,
            )
            .is_empty());
    }

    #[test]
    fn test_deterministic_given_snapshot_order() {
        let pf = Pathfinder::new(diamond());
        let first = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
            10,
        );
        let second = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("d"),
            &[ConnectionType::Teammate],
            10,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_parallel_edge_types_yield_one_path() {
        // a-b connected by both teammate and college: one node sequence.
        let store = Arc::new(GraphStore::from_parts(
            ["a", "b"].map(player).to_vec(),
            vec![
                teammate("a", "b"),
                (
                    PlayerId::from("a"),
                    PlayerId::from("b"),
                    ConnectionType::College,
                ),
            ],
        ));
        let pf = Pathfinder::new(store);
        let paths = pf.shortest_paths(
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            &[ConnectionType::Teammate, ConnectionType::College],
            10,
        );
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0], ids(&["a", "b"]));
    }
}
