//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use das_algo::{AlgorithmConstructor, AlgorithmRegistry, NodeAlgorithm};
use das_bus::{EventBus, EventListener};
use das_common::MiddlewareConfig;
use das_msg::{
    MetricsSnapshot, NodeId, NodeRunState, SimulationEvent, SimulationId, VisualizationSnapshot,
};
use das_net::{MessagingPort, VirtualNetwork};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, SimulationConfig, SimulationParameters};
use crate::context::EngineContext;
use crate::export::{self, ExportFormat};
use crate::metrics::MetricsAggregator;
use crate::record::EventRecorder;
use crate::topology::{self, NeighborMap};
use crate::visual::VisualTracker;
use crate::{EngineError, Result};

/// Floor on the driver tick so one round is long enough for the virtual
/// transport to complete at least one exchange.
const MIN_ROUND_MILLIS: u64 = 25;

/// How long `stop` waits for the driver before aborting it.
const DRIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle states of a simulation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created but not yet materialized (never observable through the API).
    Uninitialized,
    /// Nodes and topology allocated.
    Initialized,
    /// An algorithm has been bound.
    Configured,
    /// The driver is advancing rounds.
    Running,
    /// Round progression suspended; queues keep draining.
    Paused,
    /// Terminal. Resources are released and the id no longer resolves.
    Stopped,
}

struct SelectedAlgorithm {
    id: String,
    constructor: AlgorithmConstructor,
}

struct NodeRuntime {
    id: NodeId,
    algorithm: Mutex<Box<dyn NodeAlgorithm>>,
    ctx: Arc<EngineContext>,
}

struct SimulationInner {
    id: SimulationId,
    bus: EventBus,
    network: NetworkConfig,
    topology: NeighborMap,
    state: RwLock<RunState>,
    algorithm: RwLock<Option<SelectedAlgorithm>>,
    parameters: RwLock<SimulationParameters>,
    port: RwLock<Option<Arc<dyn MessagingPort>>>,
    nodes: RwLock<Vec<Arc<NodeRuntime>>>,
    recorder: EventRecorder,
    metrics: MetricsAggregator,
    visual: VisualTracker,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// One independent simulation: topology, nodes, algorithm, messaging, and
/// observers. Cheap to clone; clones share the instance.
#[derive(Clone)]
pub struct Simulation {
    inner: Arc<SimulationInner>,
}

impl Simulation {
    /// Allocate a simulation with a fresh id in `INITIALIZED` state.
    ///
    /// The topology is generated here, deterministically from the network
    /// config and the default parameters' seed.
    pub fn create(network: NetworkConfig, defaults: SimulationParameters) -> Result<Self> {
        network.validate()?;
        defaults.validate()?;
        let topology = topology::build(network.node_count, network.topology, defaults.random_seed);
        let bus = EventBus::new();
        let recorder = EventRecorder::new();
        recorder.attach(&bus);
        let metrics = MetricsAggregator::new();
        metrics.attach(&bus);
        let visual = VisualTracker::new();
        visual.attach(&bus);
        let id = SimulationId::fresh();
        info!(simulation_id = %id, nodes = network.node_count, topology = %network.topology, "simulation initialized");
        Ok(Self {
            inner: Arc::new(SimulationInner {
                id,
                bus,
                network,
                topology,
                state: RwLock::new(RunState::Initialized),
                algorithm: RwLock::new(None),
                parameters: RwLock::new(defaults),
                port: RwLock::new(None),
                nodes: RwLock::new(Vec::new()),
                recorder,
                metrics,
                visual,
                stop_tx: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        })
    }

    /// The simulation's identity.
    pub fn id(&self) -> SimulationId {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.inner.state.read()
    }

    /// The configured neighbor sets.
    pub fn topology(&self) -> &NeighborMap {
        &self.inner.topology
    }

    /// Reconstructable configuration: network, algorithm, parameters.
    pub fn current_config(&self) -> SimulationConfig {
        SimulationConfig {
            network_config: self.inner.network,
            algorithm_id: self
                .inner
                .algorithm
                .read()
                .as_ref()
                .map(|selected| selected.id.clone()),
            default_parameters: *self.inner.parameters.read(),
        }
    }

    /// Bind an algorithm. Rejected while running or paused.
    pub fn select_algorithm(&self, algorithm_id: &str, registry: &AlgorithmRegistry) -> Result<()> {
        let mut state = self.inner.state.write();
        match *state {
            RunState::Initialized | RunState::Configured | RunState::Stopped => {}
            other => return Err(EngineError::BadState { state: other }),
        }
        let constructor = registry
            .constructor(algorithm_id)
            .ok_or_else(|| EngineError::UnknownAlgorithm(algorithm_id.to_owned()))?;
        *self.inner.algorithm.write() = Some(SelectedAlgorithm {
            id: algorithm_id.to_owned(),
            constructor,
        });
        if *state == RunState::Initialized {
            *state = RunState::Configured;
        }
        info!(simulation_id = %self.inner.id, algorithm_id, "algorithm selected");
        Ok(())
    }

    /// Attach the messaging port, host one algorithm instance per node,
    /// fire each node's `on_start` once, and hand control to the driver.
    ///
    /// Returns as soon as the driver task is spawned; rounds advance in the
    /// background until `max_steps`, convergence, or stop.
    pub async fn start(
        &self,
        params: SimulationParameters,
        middleware: &MiddlewareConfig,
    ) -> Result<()> {
        params.validate()?;
        {
            let state = self.inner.state.read();
            match *state {
                RunState::Configured => {}
                RunState::Initialized => return Err(EngineError::AlgorithmMissing),
                other => return Err(EngineError::BadState { state: other }),
            }
        }
        let constructor = {
            let selected = self.inner.algorithm.read();
            selected
                .as_ref()
                .map(|selected| selected.constructor.clone())
                .ok_or(EngineError::AlgorithmMissing)?
        };
        *self.inner.parameters.write() = params;

        let port: Arc<dyn MessagingPort> = Arc::new(VirtualNetwork::spawn(
            self.inner.bus.clone(),
            middleware.queues,
            middleware.faults,
        ));
        *self.inner.port.write() = Some(port.clone());

        // materialize node runtimes and bind one handler per node
        let mut runtimes = Vec::with_capacity(self.inner.topology.len());
        for (node, neighbors) in &self.inner.topology {
            let runtime = Arc::new(NodeRuntime {
                id: node.clone(),
                algorithm: Mutex::new(constructor(node.clone())),
                ctx: Arc::new(EngineContext::new(
                    node.clone(),
                    neighbors.clone(),
                    port.clone(),
                )),
            });
            self.inner.bus.publish(&SimulationEvent::state_changed(
                node.clone(),
                NodeRunState::Initialized,
            ));
            let handler_runtime = runtime.clone();
            port.register_handler(
                node.clone(),
                Arc::new(move |message| {
                    let mut algorithm = handler_runtime.algorithm.lock();
                    algorithm.on_message(handler_runtime.ctx.as_ref(), &message);
                }),
            );
            runtimes.push(runtime);
        }
        *self.inner.nodes.write() = runtimes.clone();

        let (stop_tx, stop_rx) = broadcast::channel(4);
        *self.inner.stop_tx.lock() = Some(stop_tx);
        *self.inner.state.write() = RunState::Running;
        self.inner.metrics.mark_started();

        // fire on_start exactly once per node, isolating algorithm panics
        for runtime in &runtimes {
            self.inner.bus.publish(&SimulationEvent::state_changed(
                runtime.id.clone(),
                NodeRunState::Running,
            ));
            let started = catch_unwind(AssertUnwindSafe(|| {
                let mut algorithm = runtime.algorithm.lock();
                algorithm.on_start(runtime.ctx.as_ref());
            }));
            if started.is_err() {
                warn!(simulation_id = %self.inner.id, node_id = %runtime.id, "algorithm panicked in on_start");
                self.inner.bus.publish(&SimulationEvent::error(
                    runtime.id.clone(),
                    "algorithm panic in on_start",
                ));
            }
        }

        let driver = tokio::spawn(run_driver(self.inner.clone(), params, stop_rx));
        *self.inner.driver.lock() = Some(driver);
        info!(simulation_id = %self.inner.id, max_steps = params.max_steps, "simulation started");
        Ok(())
    }

    /// Suspend round progression. Queues keep draining.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        match *state {
            RunState::Running => {
                *state = RunState::Paused;
                info!(simulation_id = %self.inner.id, "simulation paused");
                Ok(())
            }
            other => Err(EngineError::BadState { state: other }),
        }
    }

    /// Resume a paused simulation.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        match *state {
            RunState::Paused => {
                *state = RunState::Running;
                info!(simulation_id = %self.inner.id, "simulation resumed");
                Ok(())
            }
            other => Err(EngineError::BadState { state: other }),
        }
    }

    /// Terminal stop: cancel the driver, release the transport, unregister
    /// handlers, and freeze metrics. Completes in bounded time even under
    /// queue pressure.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            if *state == RunState::Stopped {
                return Err(EngineError::BadState {
                    state: RunState::Stopped,
                });
            }
            *state = RunState::Stopped;
        }
        if let Some(stop_tx) = self.inner.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        let driver = self.inner.driver.lock().take();
        if let Some(mut driver) = driver {
            tokio::select! {
                _ = &mut driver => {}
                _ = tokio::time::sleep(DRIVER_JOIN_TIMEOUT) => {
                    warn!(simulation_id = %self.inner.id, "driver did not stop in time; aborting");
                    driver.abort();
                }
            }
        }
        if let Some(port) = self.inner.port.write().take() {
            for node in self.inner.topology.keys() {
                port.unregister_handler(node);
            }
            port.shutdown();
        }
        for node in self.inner.topology.keys() {
            self.inner.bus.publish(&SimulationEvent::state_changed(
                node.clone(),
                NodeRunState::Stopped,
            ));
        }
        self.inner.nodes.write().clear();
        self.inner.metrics.freeze();
        info!(simulation_id = %self.inner.id, "simulation stopped");
        Ok(())
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Current read-only visualization snapshot.
    pub fn visualization(&self) -> VisualizationSnapshot {
        self.inner
            .visual
            .snapshot(&self.inner.topology, self.inner.metrics.leader().as_ref())
    }

    /// Subscribe `listener` to every event type. Listener failures are
    /// isolated by the bus and cannot affect simulation progression.
    pub fn register_visualization_listener(&self, listener: EventListener) {
        self.inner.bus.subscribe_all(listener);
    }

    /// Formatted, timestamp-ordered log lines, optionally filtered.
    pub fn logs(&self, filter: Option<&str>) -> Vec<String> {
        self.inner.recorder.logs(filter)
    }

    /// Render recorded events and metrics in the named format.
    pub fn export(&self, format: &str) -> Result<Vec<u8>> {
        let format = ExportFormat::parse(format)?;
        export::render(format, &self.inner.recorder.events(), &self.metrics())
    }
}

/// Identity used for engine-level events that concern no single node.
fn engine_node() -> NodeId {
    NodeId::new("engine").expect("literal id is non-blank")
}

/// Advance rounds until `max_steps`, convergence, or stop.
async fn run_driver(
    inner: Arc<SimulationInner>,
    params: SimulationParameters,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let tick = Duration::from_millis(params.message_delay_millis.max(MIN_ROUND_MILLIS));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expected_leader = inner
        .topology
        .keys()
        .max_by(|a, b| a.cmp_numeric(b))
        .cloned();
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!(simulation_id = %inner.id, "driver received stop");
                break;
            }
            _ = interval.tick() => {
                if *inner.state.read() == RunState::Paused {
                    continue;
                }
                // convergence is checked before a new round is counted, so
                // `rounds` reports the round during which agreement happened
                if let Some(expected) = &expected_leader {
                    let all_agree = inner
                        .nodes
                        .read()
                        .iter()
                        .all(|runtime| {
                            runtime.algorithm.lock().current_leader().as_ref() == Some(expected)
                        });
                    if all_agree {
                        inner
                            .bus
                            .publish(&SimulationEvent::leader_elected(expected.clone()));
                        info!(
                            simulation_id = %inner.id,
                            leader = %expected,
                            round = inner.metrics.rounds(),
                            "leader elected"
                        );
                        break;
                    }
                }
                // the aggregator counts rounds off this marker
                let next_round = inner.metrics.rounds() + 1;
                inner.bus.publish(&SimulationEvent::metrics_update(
                    engine_node(),
                    format!("round={next_round}"),
                ));
                if inner.metrics.rounds() >= params.max_steps {
                    debug!(simulation_id = %inner.id, rounds = inner.metrics.rounds(), "driver reached max steps");
                    break;
                }
            }
        }
    }
}
