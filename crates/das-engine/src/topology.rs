//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};

use das_msg::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Topology;

/// Probability of adding each non-tree edge to a RANDOM topology.
const RANDOM_EDGE_PROBABILITY: f64 = 0.3;

/// Neighbor sets per node. Every node appears as a key, even with an empty
/// neighborhood; all edges are bidirectional.
pub type NeighborMap = BTreeMap<NodeId, BTreeSet<NodeId>>;

/// Deterministically generate the neighbor map for `(node_count, topology)`.
///
/// Nodes are named `node-0 .. node-<n-1>`. The seed only affects
/// [`Topology::Random`].
pub fn build(node_count: usize, topology: Topology, seed: u64) -> NeighborMap {
    let mut map: NeighborMap = (0..node_count)
        .map(|i| (NodeId::indexed(i as u64), BTreeSet::new()))
        .collect();
    match topology {
        Topology::Line => {
            for i in 1..node_count {
                connect(&mut map, i - 1, i);
            }
        }
        Topology::Ring => {
            if node_count > 1 {
                for i in 0..node_count {
                    connect(&mut map, i, (i + 1) % node_count);
                }
            }
        }
        Topology::Grid => {
            let rows = (node_count as f64).sqrt().floor().max(1.0) as usize;
            let cols = node_count.div_ceil(rows);
            for i in 0..node_count {
                let (row, col) = (i / cols, i % cols);
                if col + 1 < cols && i + 1 < node_count && (i + 1) / cols == row {
                    connect(&mut map, i, i + 1);
                }
                if i + cols < node_count {
                    connect(&mut map, i, i + cols);
                }
            }
        }
        Topology::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            // spanning tree first, so the graph is always connected
            for i in 1..node_count {
                let j = rng.gen_range(0..i);
                connect(&mut map, j, i);
            }
            for i in 0..node_count {
                for j in (i + 1)..node_count {
                    if !adjacent(&map, i, j) && rng.gen::<f64>() < RANDOM_EDGE_PROBABILITY {
                        connect(&mut map, i, j);
                    }
                }
            }
        }
    }
    map
}

fn connect(map: &mut NeighborMap, a: usize, b: usize) {
    if a == b {
        return;
    }
    let (a, b) = (NodeId::indexed(a as u64), NodeId::indexed(b as u64));
    map.get_mut(&a).expect("node exists").insert(b.clone());
    map.get_mut(&b).expect("node exists").insert(a);
}

fn adjacent(map: &NeighborMap, a: usize, b: usize) -> bool {
    map.get(&NodeId::indexed(a as u64))
        .map(|neighbors| neighbors.contains(&NodeId::indexed(b as u64)))
        .unwrap_or(false)
}
