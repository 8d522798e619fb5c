//! ---
//! das_section: "04-node-algorithms"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node algorithm contract and reference algorithms."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use das_msg::{NodeId, SimulationMessage};
use serde_json::json;
use tracing::{debug, trace};

use crate::{NodeAlgorithm, NodeContext};

/// Registry id of the flooding leader election.
pub const FLOODING_LEADER_ELECTION: &str = "flooding-leader-election";

/// Message type carried by leader announcements.
pub const LEADER_ANNOUNCEMENT: &str = "LEADER_ANNOUNCEMENT";

/// Flooding-based leader election.
///
/// Every node starts by announcing itself; on hearing a candidate with a
/// strictly larger numeric id it adopts the candidate and re-floods. In any
/// connected topology all nodes converge on the maximum numeric id within
/// O(diameter) rounds under no-loss conditions. Announcements that do not
/// improve the local view are suppressed, which is what terminates the
/// flood.
pub struct FloodingLeaderElection {
    node: NodeId,
    current_leader: NodeId,
}

impl FloodingLeaderElection {
    /// Create the algorithm instance for `node`, initially voting for
    /// itself.
    pub fn new(node: NodeId) -> Self {
        Self {
            current_leader: node.clone(),
            node,
        }
    }

    fn announcement(&self) -> SimulationMessage {
        // receiver is a placeholder; broadcast rewrites it per neighbor
        SimulationMessage::new(self.node.clone(), self.node.clone(), LEADER_ANNOUNCEMENT)
            .with_payload(json!({ "leader": self.current_leader.as_str() }))
    }

    fn candidate_from(message: &SimulationMessage) -> Option<NodeId> {
        let raw = message.payload.as_ref()?.get("leader")?.as_str()?;
        NodeId::new(raw).ok()
    }
}

impl NodeAlgorithm for FloodingLeaderElection {
    fn on_start(&mut self, ctx: &dyn NodeContext) {
        debug!(node_id = %self.node, "announcing initial leader candidate");
        ctx.broadcast(self.announcement());
    }

    fn on_message(&mut self, ctx: &dyn NodeContext, message: &SimulationMessage) {
        if message.message_type != LEADER_ANNOUNCEMENT {
            trace!(node_id = %self.node, message_type = %message.message_type, "ignoring message");
            return;
        }
        let Some(candidate) = Self::candidate_from(message) else {
            debug!(node_id = %self.node, "announcement without a usable leader field");
            return;
        };
        // strict numeric improvement only; equality is the echo being suppressed
        if candidate.cmp_numeric(&self.current_leader) == std::cmp::Ordering::Greater {
            debug!(node_id = %self.node, leader = %candidate, "adopting better candidate");
            self.current_leader = candidate;
            ctx.broadcast(self.announcement());
        }
    }

    fn current_leader(&self) -> Option<NodeId> {
        Some(self.current_leader.clone())
    }
}
