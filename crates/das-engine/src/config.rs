//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

fn default_random_seed() -> u64 {
    42
}

fn default_max_steps() -> u64 {
    100
}

/// Shape of the generated network graph.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Topology {
    /// Path graph: node i neighbors i-1 and i+1 where present.
    Line,
    /// Cycle graph; a single node has no neighbors.
    Ring,
    /// Near-square lattice with 4-neighborhoods; the last row may be
    /// partially filled.
    Grid,
    /// Seeded random graph: a spanning tree plus extra edges.
    Random,
}

/// What network to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Number of nodes, at least 1.
    pub node_count: usize,
    /// Graph shape.
    pub topology: Topology,
}

impl NetworkConfig {
    /// Construct a config; validation happens separately.
    pub fn new(node_count: usize, topology: Topology) -> Self {
        Self {
            node_count,
            topology,
        }
    }

    /// Check the documented constraints.
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 1 {
            return Err(EngineError::InvalidConfig(
                "nodeCount must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Per-run tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    /// Seed for random topology generation and reproducible runs.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Upper bound on driver rounds, at least 1.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Pacing of driver rounds in milliseconds; 0 uses the engine floor.
    #[serde(default)]
    pub message_delay_millis: u64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            random_seed: default_random_seed(),
            max_steps: default_max_steps(),
            message_delay_millis: 0,
        }
    }
}

impl SimulationParameters {
    /// Check the documented constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps < 1 {
            return Err(EngineError::InvalidConfig(
                "maxSteps must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to recreate a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Network generation input.
    pub network_config: NetworkConfig,
    /// Selected algorithm, when one has been bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm_id: Option<String>,
    /// Parameters used when `start` is called without overrides.
    #[serde(default)]
    pub default_parameters: SimulationParameters,
}

impl SimulationConfig {
    /// Check the documented constraints of every component.
    pub fn validate(&self) -> Result<()> {
        self.network_config.validate()?;
        self.default_parameters.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_names_parse_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(Topology::from_str("RING").unwrap(), Topology::Ring);
        assert_eq!(Topology::from_str("grid").unwrap(), Topology::Grid);
        assert!(Topology::from_str("torus").is_err());
    }

    #[test]
    fn configs_serialize_with_camel_case_keys() {
        let config = SimulationConfig {
            network_config: NetworkConfig::new(3, Topology::Ring),
            algorithm_id: Some("flooding-leader-election".to_owned()),
            default_parameters: SimulationParameters::default(),
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["networkConfig"]["nodeCount"], 3);
        assert_eq!(value["networkConfig"]["topology"], "RING");
        assert_eq!(value["algorithmId"], "flooding-leader-election");
        assert_eq!(value["defaultParameters"]["maxSteps"], 100);
        let roundtrip: SimulationConfig = serde_json::from_value(value).unwrap();
        assert_eq!(roundtrip, config);
    }

    #[test]
    fn invalid_counts_are_rejected() {
        assert!(NetworkConfig::new(0, Topology::Line).validate().is_err());
        let params = SimulationParameters {
            max_steps: 0,
            ..SimulationParameters::default()
        };
        assert!(params.validate().is_err());
    }
}
