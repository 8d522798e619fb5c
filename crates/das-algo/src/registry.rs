//! ---
//! das_section: "04-node-algorithms"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node algorithm contract and reference algorithms."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use das_msg::NodeId;
use parking_lot::RwLock;

use crate::flooding::{FloodingLeaderElection, FLOODING_LEADER_ELECTION};
use crate::NodeAlgorithm;

/// Factory producing one algorithm instance per hosted node.
pub type AlgorithmConstructor = Arc<dyn Fn(NodeId) -> Box<dyn NodeAlgorithm> + Send + Sync>;

/// Map from algorithm id to constructor.
///
/// Strategy pluggability without any host-language machinery: algorithms
/// are values, and selection is a string lookup.
pub struct AlgorithmRegistry {
    constructors: RwLock<HashMap<String, AlgorithmConstructor>>,
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with the reference algorithms.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(FLOODING_LEADER_ELECTION, |node| {
            Box::new(FloodingLeaderElection::new(node))
        });
        registry
    }

    /// Register (or replace) a constructor under `id`.
    pub fn register<F>(&self, id: impl Into<String>, constructor: F)
    where
        F: Fn(NodeId) -> Box<dyn NodeAlgorithm> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(id.into(), Arc::new(constructor));
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.read().contains_key(id)
    }

    /// Look up the constructor for `id`.
    pub fn constructor(&self, id: &str) -> Option<AlgorithmConstructor> {
        self.constructors.read().get(id).cloned()
    }

    /// Instantiate the algorithm `id` for `node`.
    pub fn instantiate(&self, id: &str, node: NodeId) -> Option<Box<dyn NodeAlgorithm>> {
        self.constructor(id).map(|constructor| constructor(node))
    }

    /// Registered ids, unordered.
    pub fn ids(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_the_flooding_election() {
        let registry = AlgorithmRegistry::with_defaults();
        assert!(registry.contains(FLOODING_LEADER_ELECTION));
        let instance = registry
            .instantiate(FLOODING_LEADER_ELECTION, NodeId::indexed(2))
            .unwrap();
        assert_eq!(instance.current_leader(), Some(NodeId::indexed(2)));
    }

    #[test]
    fn unknown_ids_yield_nothing() {
        let registry = AlgorithmRegistry::with_defaults();
        assert!(!registry.contains("paxos"));
        assert!(registry.instantiate("paxos", NodeId::indexed(0)).is_none());
    }

    #[test]
    fn custom_algorithms_can_be_registered() {
        struct Idle;
        impl NodeAlgorithm for Idle {
            fn on_start(&mut self, _ctx: &dyn crate::NodeContext) {}
            fn on_message(
                &mut self,
                _ctx: &dyn crate::NodeContext,
                _message: &das_msg::SimulationMessage,
            ) {
            }
            fn current_leader(&self) -> Option<NodeId> {
                None
            }
        }

        let registry = AlgorithmRegistry::new();
        registry.register("idle", |_node| Box::new(Idle));
        assert!(registry.contains("idle"));
        assert_eq!(registry.ids(), vec!["idle".to_string()]);
    }
}
