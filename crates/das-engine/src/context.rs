//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::sync::Arc;

use das_algo::NodeContext;
use das_msg::{NodeId, SimulationMessage};
use das_net::MessagingPort;

/// The engine's [`NodeContext`] implementation.
///
/// Holds the node's identity, its configured neighborhood, and the
/// simulation's messaging port. This is the only channel an algorithm has
/// to the outside; it cannot reach the bus or the engine through it.
pub struct EngineContext {
    node: NodeId,
    neighbors: BTreeSet<NodeId>,
    port: Arc<dyn MessagingPort>,
}

impl EngineContext {
    pub(crate) fn new(
        node: NodeId,
        neighbors: BTreeSet<NodeId>,
        port: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            node,
            neighbors,
            port,
        }
    }
}

impl NodeContext for EngineContext {
    fn self_id(&self) -> &NodeId {
        &self.node
    }

    fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    fn send(&self, peer: &NodeId, message: SimulationMessage) -> bool {
        self.port.send(peer, message)
    }

    fn broadcast(&self, base: SimulationMessage) -> usize {
        let receivers: Vec<NodeId> = self.neighbors.iter().cloned().collect();
        self.port.broadcast(&receivers, base)
    }
}
