//! ---
//! das_section: "06-control-facade"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Control facade combining engine, algorithms, and middleware."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Transport-agnostic control facade.
//!
//! [`SimulationControl`] is the one entry point an outer surface (HTTP,
//! CLI, tests) needs: create simulations, pick algorithms, drive the
//! lifecycle, and read snapshots, logs, and exports. It owns the
//! simulation registry and the algorithm registry; everything per-run
//! lives inside the individual [`Simulation`]s.

use std::collections::HashMap;

use das_algo::AlgorithmRegistry;
use das_bus::EventListener;
use das_common::MiddlewareConfig;
use das_engine::{
    EngineError, NetworkConfig, Simulation, SimulationConfig, SimulationParameters,
};
use das_msg::{MetricsSnapshot, SimulationId, VisualizationSnapshot};
use parking_lot::RwLock;
use tracing::info;

/// Shared result type for facade operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the control facade.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No simulation is registered under the given id.
    #[error("unknown simulation {0}")]
    UnknownSimulation(SimulationId),
    /// A configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The requested algorithm id is not registered.
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),
    /// The operation is not permitted in the simulation's current state.
    #[error("bad state: {0}")]
    BadState(String),
    /// The requested export format is not supported.
    #[error("unsupported export format {0:?}")]
    BadFormat(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidConfig(detail) => Self::InvalidConfig(detail),
            EngineError::UnknownAlgorithm(id) => Self::UnknownAlgorithm(id),
            EngineError::BadFormat(format) => Self::BadFormat(format),
            EngineError::AlgorithmMissing => Self::BadState("no algorithm selected".to_owned()),
            EngineError::BadState { state } => Self::BadState(state.to_string()),
        }
    }
}

/// The public control surface over all live simulations.
pub struct SimulationControl {
    simulations: RwLock<HashMap<SimulationId, Simulation>>,
    algorithms: AlgorithmRegistry,
    middleware: MiddlewareConfig,
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new(MiddlewareConfig::default())
    }
}

impl SimulationControl {
    /// Build a facade with the default algorithm registry and the given
    /// middleware configuration (usually [`MiddlewareConfig::from_env`]).
    pub fn new(middleware: MiddlewareConfig) -> Self {
        Self {
            simulations: RwLock::new(HashMap::new()),
            algorithms: AlgorithmRegistry::with_defaults(),
            middleware,
        }
    }

    /// The algorithm registry, for registering custom strategies.
    pub fn algorithms(&self) -> &AlgorithmRegistry {
        &self.algorithms
    }

    fn resolve(&self, id: SimulationId) -> Result<Simulation> {
        self.simulations
            .read()
            .get(&id)
            .cloned()
            .ok_or(ApiError::UnknownSimulation(id))
    }

    /// Create a simulation from a network config; returns its fresh id.
    pub fn initialize_network(&self, network: NetworkConfig) -> Result<SimulationId> {
        let simulation = Simulation::create(network, SimulationParameters::default())?;
        let id = simulation.id();
        self.simulations.write().insert(id, simulation);
        Ok(id)
    }

    /// Recreate a simulation from an exported config; returns a fresh id.
    pub fn load_config(&self, config: SimulationConfig) -> Result<SimulationId> {
        config.validate()?;
        let algorithm_id = config
            .algorithm_id
            .clone()
            .ok_or_else(|| ApiError::InvalidConfig("algorithmId is required".to_owned()))?;
        if !self.algorithms.contains(&algorithm_id) {
            return Err(ApiError::UnknownAlgorithm(algorithm_id));
        }
        let simulation = Simulation::create(config.network_config, config.default_parameters)?;
        simulation.select_algorithm(&algorithm_id, &self.algorithms)?;
        let id = simulation.id();
        self.simulations.write().insert(id, simulation);
        info!(simulation_id = %id, algorithm_id, "simulation loaded from config");
        Ok(id)
    }

    /// Bind an algorithm to a simulation.
    pub fn select_algorithm(&self, id: SimulationId, algorithm_id: &str) -> Result<()> {
        let simulation = self.resolve(id)?;
        simulation.select_algorithm(algorithm_id, &self.algorithms)?;
        Ok(())
    }

    /// Start a simulation; returns once the run is launched.
    pub async fn start_simulation(
        &self,
        id: SimulationId,
        params: SimulationParameters,
    ) -> Result<()> {
        let simulation = self.resolve(id)?;
        simulation.start(params, &self.middleware).await?;
        Ok(())
    }

    /// Suspend round progression.
    pub fn pause_simulation(&self, id: SimulationId) -> Result<()> {
        Ok(self.resolve(id)?.pause()?)
    }

    /// Resume a paused simulation.
    pub fn resume_simulation(&self, id: SimulationId) -> Result<()> {
        Ok(self.resolve(id)?.resume()?)
    }

    /// Stop a simulation and remove it from the registry. Afterwards the
    /// id no longer resolves.
    pub async fn stop_simulation(&self, id: SimulationId) -> Result<()> {
        let simulation = self.resolve(id)?;
        simulation.stop().await?;
        self.simulations.write().remove(&id);
        Ok(())
    }

    /// Current metrics snapshot.
    pub fn get_metrics(&self, id: SimulationId) -> Result<MetricsSnapshot> {
        Ok(self.resolve(id)?.metrics())
    }

    /// Current read-only visualization snapshot.
    pub fn get_current_visualization(&self, id: SimulationId) -> Result<VisualizationSnapshot> {
        Ok(self.resolve(id)?.visualization())
    }

    /// Subscribe a listener to all of a simulation's events.
    pub fn register_visualization_listener(
        &self,
        id: SimulationId,
        listener: EventListener,
    ) -> Result<()> {
        self.resolve(id)?.register_visualization_listener(listener);
        Ok(())
    }

    /// The simulation's reconstructable configuration.
    pub fn get_current_config(&self, id: SimulationId) -> Result<SimulationConfig> {
        Ok(self.resolve(id)?.current_config())
    }

    /// Render recorded events and metrics as `"JSON"` or `"CSV"` (names
    /// are case-insensitive).
    pub fn export_run_data(&self, id: SimulationId, format: &str) -> Result<Vec<u8>> {
        Ok(self.resolve(id)?.export(format)?)
    }

    /// Formatted, timestamp-ordered log lines, optionally filtered.
    pub fn get_logs(&self, id: SimulationId, filter: Option<&str>) -> Result<Vec<String>> {
        Ok(self.resolve(id)?.logs(filter))
    }

    /// Ids of all live simulations.
    pub fn simulation_ids(&self) -> Vec<SimulationId> {
        self.simulations.read().keys().copied().collect()
    }
}
