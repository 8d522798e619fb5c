//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
//! The simulation engine: per-simulation lifecycle, deterministic topology
//! generation, algorithm hosting, metrics aggregation, visualization, and
//! run data export.
//!
//! Each [`Simulation`] owns an isolated event bus, transport, handler map,
//! and topology. Nothing is process-global; concurrent simulations cannot
//! observe each other.

pub mod config;
pub mod context;
pub mod export;
pub mod metrics;
pub mod record;
pub mod simulation;
pub mod topology;
pub mod visual;

/// Shared result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to callers of the engine.
///
/// Message-level failures never appear here; they surface as `ERROR`
/// events per the best-effort contract.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The requested algorithm id is not registered.
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),
    /// The operation is not permitted in the simulation's current state.
    #[error("operation not allowed while {state}")]
    BadState {
        /// The state the simulation was in.
        state: simulation::RunState,
    },
    /// `start` was called before an algorithm was selected.
    #[error("no algorithm selected")]
    AlgorithmMissing,
    /// The requested export format is not supported.
    #[error("unsupported export format {0:?}")]
    BadFormat(String),
}

pub use config::{NetworkConfig, SimulationConfig, SimulationParameters, Topology};
pub use export::ExportFormat;
pub use simulation::{RunState, Simulation};
