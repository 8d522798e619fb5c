//! ---
//! das_section: "01-identity-wire-types"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node identities, message schema, and event types."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeRunState};

/// Point-in-time metrics for one simulation.
///
/// Counters never decrease while a simulation runs; `real_time_millis` is
/// frozen when the simulation stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Engine rounds elapsed; the simulated clock.
    pub simulated_time: u64,
    /// Wall-clock milliseconds since the run started.
    pub real_time_millis: u64,
    /// Messages accepted by the middleware.
    pub message_count: u64,
    /// Engine rounds driven so far.
    pub rounds: u64,
    /// Whether a leader has been agreed on.
    pub converged: bool,
    /// The agreed leader, once converged. Serialized as `null` before that.
    pub leader_id: Option<NodeId>,
}

impl MetricsSnapshot {
    /// Snapshot of a simulation that has not started.
    pub fn zero() -> Self {
        Self {
            simulated_time: 0,
            real_time_millis: 0,
            message_count: 0,
            rounds: 0,
            converged: false,
            leader_id: None,
        }
    }
}

/// One node's row in a [`VisualizationSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    node_id: NodeId,
    state: NodeRunState,
    is_leader: bool,
}

impl NodeView {
    /// Build a row for `node_id` in `state`.
    pub fn new(node_id: NodeId, state: NodeRunState, is_leader: bool) -> Self {
        Self {
            node_id,
            state,
            is_leader,
        }
    }

    /// The node this row describes.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Lifecycle state derived from observed `STATE_CHANGED` events.
    pub fn state(&self) -> NodeRunState {
        self.state
    }

    /// Whether this node matches the currently elected leader.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// Read-only view of a simulation for renderers.
///
/// Fields are private; the snapshot is a detached value and mutating it is
/// not possible through its API, so renderers cannot reach back into the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationSnapshot {
    timestamp: DateTime<Utc>,
    nodes: Vec<NodeView>,
    topology: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl VisualizationSnapshot {
    /// Assemble a snapshot stamped with the current wall-clock time.
    pub fn new(nodes: Vec<NodeView>, topology: BTreeMap<NodeId, BTreeSet<NodeId>>) -> Self {
        Self {
            timestamp: Utc::now(),
            nodes,
            topology,
        }
    }

    /// When the snapshot was taken.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Per-node rows, in id order.
    pub fn nodes(&self) -> &[NodeView] {
        &self.nodes
    }

    /// The configured neighbor sets.
    pub fn topology(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_metrics_serialize_with_null_leader() {
        let value = serde_json::to_value(MetricsSnapshot::zero()).unwrap();
        assert_eq!(value["simulatedTime"], 0);
        assert_eq!(value["realTimeMillis"], 0);
        assert_eq!(value["messageCount"], 0);
        assert_eq!(value["rounds"], 0);
        assert_eq!(value["converged"], false);
        assert!(value["leaderId"].is_null());
    }

    #[test]
    fn visualization_snapshot_exposes_rows_read_only() {
        let mut topology = BTreeMap::new();
        topology.insert(
            NodeId::indexed(0),
            BTreeSet::from([NodeId::indexed(1)]),
        );
        topology.insert(
            NodeId::indexed(1),
            BTreeSet::from([NodeId::indexed(0)]),
        );
        let snapshot = VisualizationSnapshot::new(
            vec![
                NodeView::new(NodeId::indexed(0), NodeRunState::Running, false),
                NodeView::new(NodeId::indexed(1), NodeRunState::Running, true),
            ],
            topology,
        );
        assert_eq!(snapshot.nodes().len(), 2);
        assert!(snapshot.nodes()[1].is_leader());
        assert_eq!(snapshot.topology().len(), 2);
    }
}
