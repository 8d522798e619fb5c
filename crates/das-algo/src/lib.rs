//! ---
//! das_section: "04-node-algorithms"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node algorithm contract and reference algorithms."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Node algorithm contract and the flooding leader election reference.
//!
//! Algorithms are values with two operations, bound to nodes at run start.
//! The [`NodeContext`] handed to them is their only outward channel; they
//! never touch the bus, the port, or the engine directly.

pub mod flooding;
pub mod registry;

use std::collections::BTreeSet;

use das_msg::{NodeId, SimulationMessage};

/// The engine-provided view a node algorithm acts through.
pub trait NodeContext: Send + Sync {
    /// The hosting node's identity.
    fn self_id(&self) -> &NodeId;

    /// The hosting node's configured neighbors.
    fn neighbors(&self) -> &BTreeSet<NodeId>;

    /// Send one message to a peer. Returns the middleware's acceptance
    /// boolean; best-effort semantics apply after acceptance.
    fn send(&self, peer: &NodeId, message: SimulationMessage) -> bool;

    /// Send `base` to every neighbor, rewriting the receiver per target.
    /// Returns how many sends were accepted.
    fn broadcast(&self, base: SimulationMessage) -> usize;
}

/// A pluggable per-node algorithm.
///
/// `on_start` fires exactly once when the simulation starts; `on_message`
/// fires for each delivered message, serially per node. The
/// [`current_leader`](Self::current_leader) accessor is the observation
/// seam the engine aggregates for convergence detection.
pub trait NodeAlgorithm: Send {
    /// Called once when the hosting simulation starts.
    fn on_start(&mut self, ctx: &dyn NodeContext);

    /// Called for every message delivered to the hosting node.
    fn on_message(&mut self, ctx: &dyn NodeContext, message: &SimulationMessage);

    /// The node's current view of the elected leader, if the algorithm
    /// tracks one.
    fn current_leader(&self) -> Option<NodeId>;
}

pub use flooding::{FloodingLeaderElection, FLOODING_LEADER_ELECTION, LEADER_ANNOUNCEMENT};
pub use registry::{AlgorithmConstructor, AlgorithmRegistry};
