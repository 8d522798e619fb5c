//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use das_bus::EventBus;
use das_msg::{EventType, NodeId, NodeRunState, NodeView, VisualizationSnapshot};
use parking_lot::Mutex;
use tracing::trace;

use crate::topology::NeighborMap;

/// Derives per-node lifecycle states from observed `STATE_CHANGED` events.
///
/// The state machine is `INITIALIZED -> RUNNING -> STOPPED`; transitions
/// that would move backwards are ignored, so replayed or late events cannot
/// corrupt the view.
#[derive(Clone, Default)]
pub struct VisualTracker {
    states: Arc<Mutex<BTreeMap<NodeId, NodeRunState>>>,
}

impl VisualTracker {
    /// A tracker with no observed nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the tracker to `STATE_CHANGED` events on `bus`.
    pub fn attach(&self, bus: &EventBus) {
        let states = self.states.clone();
        bus.subscribe(
            EventType::StateChanged,
            Arc::new(move |event| {
                let Ok(next) = NodeRunState::from_str(&event.payload_summary) else {
                    trace!(summary = %event.payload_summary, "unparseable state change");
                    return;
                };
                let mut states = states.lock();
                let entry = states
                    .entry(event.node_id.clone())
                    .or_insert(NodeRunState::Initialized);
                if allowed(*entry, next) {
                    *entry = next;
                }
            }),
        );
    }

    /// Build the read-only snapshot for renderers.
    ///
    /// Nodes the tracker has not seen yet report `INITIALIZED`;
    /// `is_leader` marks the node matching the currently elected leader.
    pub fn snapshot(
        &self,
        topology: &NeighborMap,
        leader: Option<&NodeId>,
    ) -> VisualizationSnapshot {
        let states = self.states.lock();
        let nodes = topology
            .keys()
            .map(|node| {
                let state = states
                    .get(node)
                    .copied()
                    .unwrap_or(NodeRunState::Initialized);
                NodeView::new(node.clone(), state, Some(node) == leader)
            })
            .collect();
        VisualizationSnapshot::new(nodes, topology.clone())
    }
}

fn allowed(from: NodeRunState, to: NodeRunState) -> bool {
    use NodeRunState::*;
    matches!(
        (from, to),
        (Initialized, Initialized) | (Initialized, Running) | (Running, Stopped) | (Initialized, Stopped)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_msg::SimulationEvent;

    fn state_event(node: u64, state: NodeRunState) -> SimulationEvent {
        SimulationEvent::state_changed(NodeId::indexed(node), state)
    }

    fn ring2() -> NeighborMap {
        crate::topology::build(2, crate::config::Topology::Ring, 42)
    }

    #[test]
    fn unseen_nodes_report_initialized() {
        let tracker = VisualTracker::new();
        let snapshot = tracker.snapshot(&ring2(), None);
        assert!(snapshot
            .nodes()
            .iter()
            .all(|node| node.state() == NodeRunState::Initialized));
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        let bus = EventBus::new();
        let tracker = VisualTracker::new();
        tracker.attach(&bus);

        bus.publish(&state_event(0, NodeRunState::Running));
        bus.publish(&state_event(1, NodeRunState::Running));
        bus.publish(&state_event(0, NodeRunState::Stopped));
        // backwards transition must be ignored
        bus.publish(&state_event(0, NodeRunState::Running));

        let snapshot = tracker.snapshot(&ring2(), Some(&NodeId::indexed(1)));
        assert_eq!(snapshot.nodes()[0].state(), NodeRunState::Stopped);
        assert_eq!(snapshot.nodes()[1].state(), NodeRunState::Running);
        assert!(!snapshot.nodes()[0].is_leader());
        assert!(snapshot.nodes()[1].is_leader());
    }

    #[test]
    fn topology_is_mirrored_into_the_snapshot() {
        let tracker = VisualTracker::new();
        let topology = ring2();
        let snapshot = tracker.snapshot(&topology, None);
        assert_eq!(snapshot.topology(), &topology);
    }
}
