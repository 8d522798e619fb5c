//! ---
//! das_section: "07-deployment"
//! das_subsection: "binary"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Binary entrypoint for a standalone UDP simulation node."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
//! One simulation node per process, addressed by hostname.
//!
//! Configuration is taken entirely from the environment (`NODE_ID`,
//! `UDP_PORT`, `HOST_TEMPLATE` or `PEERS`, queue and fault knobs), which is
//! what container deployments expect: set the container hostname to the
//! node id and every peer resolves over DNS.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use das_algo::{FloodingLeaderElection, NodeAlgorithm, NodeContext};
use das_bus::EventBus;
use das_common::{init_tracing, LogFormat, MiddlewareConfig, MiddlewareMode};
use das_msg::{NodeId, SimulationMessage};
use das_net::{MessagingPort, PeerResolver, UdpEndpoint};
use parking_lot::Mutex;
use tokio::signal;
use tracing::{info, warn};

struct StandaloneContext {
    node: NodeId,
    neighbors: std::collections::BTreeSet<NodeId>,
    port: Arc<dyn MessagingPort>,
}

impl NodeContext for StandaloneContext {
    fn self_id(&self) -> &NodeId {
        &self.node
    }

    fn neighbors(&self) -> &std::collections::BTreeSet<NodeId> {
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

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("das-node", LogFormat::StructuredJson)?;
    let config = MiddlewareConfig::from_env().context("reading middleware environment")?;
    if config.mode != MiddlewareMode::Udp {
        bail!("das-node only speaks udp; set MW_MODE=udp");
    }
    let node_id = config
        .udp
        .node_id
        .as_deref()
        .context("NODE_ID is required")
        .and_then(|raw| NodeId::from_str(raw).context("NODE_ID must be non-blank"))?;
    let resolver = PeerResolver::from_config(&config.udp).context("building peer resolver")?;
    let neighbors = neighbor_set(&config, &node_id)?;

    let bus = EventBus::new();
    bus.subscribe_all(Arc::new(|event| {
        info!(event = %event.format_log_line(), "simulation event");
    }));
    let endpoint = UdpEndpoint::bind(
        node_id.clone(),
        config.udp.port,
        resolver,
        bus,
        config.queues,
    )
    .await?;
    let port: Arc<dyn MessagingPort> = Arc::new(endpoint);

    let context = Arc::new(StandaloneContext {
        node: node_id.clone(),
        neighbors,
        port: port.clone(),
    });
    let algorithm: Arc<Mutex<Box<dyn NodeAlgorithm>>> = Arc::new(Mutex::new(Box::new(
        FloodingLeaderElection::new(node_id.clone()),
    )));

    let handler_algorithm = algorithm.clone();
    let handler_context = context.clone();
    port.register_handler(
        node_id.clone(),
        Arc::new(move |message| {
            let mut algorithm = handler_algorithm.lock();
            algorithm.on_message(handler_context.as_ref(), &message);
        }),
    );

    algorithm.lock().on_start(context.as_ref());
    info!(node_id = %node_id, port = config.udp.port, "node running; ctrl-c to stop");

    signal::ctrl_c().await.context("waiting for shutdown")?;
    let leader = algorithm.lock().current_leader();
    match leader {
        Some(leader) => info!(leader = %leader, "shutting down"),
        None => warn!("shutting down without an elected leader"),
    }
    port.shutdown();
    Ok(())
}

/// In a pattern deployment every other node in the bounded range is a
/// neighbor; with an explicit peer list, every listed peer is.
fn neighbor_set(
    config: &MiddlewareConfig,
    local: &NodeId,
) -> Result<std::collections::BTreeSet<NodeId>> {
    if let Some(peers) = &config.udp.peers {
        return Ok(peers
            .split(',')
            .filter_map(|entry| entry.trim().split(':').next())
            .filter(|id| !id.is_empty())
            .filter_map(|id| NodeId::from_str(id).ok())
            .filter(|id| id != local)
            .collect());
    }
    let count = config
        .udp
        .node_count
        .context("NODE_COUNT is required with HOST_TEMPLATE")?;
    let min = config.udp.min_id;
    Ok((min..min + count)
        .map(NodeId::indexed)
        .filter(|id| id != local)
        .collect())
}
