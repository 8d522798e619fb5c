//! ---
//! das_section: "08-testing-qa"
//! das_subsection: "integration-tests"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "End-to-end flooding election scenarios."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use das_algo::FLOODING_LEADER_ELECTION;
use das_api::SimulationControl;
use das_common::{FaultConfig, MiddlewareConfig};
use das_engine::{NetworkConfig, SimulationParameters, Topology};
use das_msg::{MetricsSnapshot, NodeId, SimulationId};

async fn wait_for_convergence(
    control: &SimulationControl,
    id: SimulationId,
    deadline_ms: u64,
) -> MetricsSnapshot {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    loop {
        let metrics = control.get_metrics(id).expect("simulation resolves");
        if metrics.converged || Instant::now() >= deadline {
            return metrics;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn run_election(
    control: &SimulationControl,
    node_count: usize,
    topology: Topology,
    params: SimulationParameters,
) -> (SimulationId, MetricsSnapshot) {
    let id = control
        .initialize_network(NetworkConfig::new(node_count, topology))
        .expect("initialize");
    control
        .select_algorithm(id, FLOODING_LEADER_ELECTION)
        .expect("select algorithm");
    control.start_simulation(id, params).await.expect("start");
    let metrics = wait_for_convergence(control, id, 10_000).await;
    (id, metrics)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ring_of_three_elects_node_two() {
    let control = SimulationControl::default();
    let params = SimulationParameters {
        random_seed: 1,
        max_steps: 10,
        message_delay_millis: 0,
    };
    let (id, metrics) = run_election(&control, 3, Topology::Ring, params).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(2)));
    assert!(metrics.rounds <= 3, "rounds={}", metrics.rounds);
    assert!(
        metrics.message_count >= 6,
        "every node announces to both neighbors; count={}",
        metrics.message_count
    );
    control.stop_simulation(id).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn line_of_five_elects_node_four() {
    let control = SimulationControl::default();
    let (id, metrics) =
        run_election(&control, 5, Topology::Line, SimulationParameters::default()).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(4)));
    assert!(metrics.rounds <= 5, "rounds={}", metrics.rounds);
    control.stop_simulation(id).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grid_of_nine_elects_node_eight() {
    let control = SimulationControl::default();
    let (id, metrics) =
        run_election(&control, 9, Topology::Grid, SimulationParameters::default()).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(8)));
    control.stop_simulation(id).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_topology_still_elects_the_maximum() {
    let control = SimulationControl::default();
    let (id, metrics) =
        run_election(&control, 8, Topology::Random, SimulationParameters::default()).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(7)));
    control.stop_simulation(id).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_virtual_transport_converges_and_takes_real_time() {
    let middleware = MiddlewareConfig {
        faults: FaultConfig {
            drop_probability: 0.0,
            delay_min_ms: 10,
            delay_max_ms: 20,
            seed: 42,
            ..FaultConfig::default()
        },
        ..MiddlewareConfig::default()
    };
    let control = SimulationControl::new(middleware);
    let (id, metrics) =
        run_election(&control, 4, Topology::Ring, SimulationParameters::default()).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(3)));
    assert!(
        metrics.real_time_millis >= 10,
        "injected delay must show up in wall time; took {}ms",
        metrics.real_time_millis
    );
    control.stop_simulation(id).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_node_converges_on_itself() {
    let control = SimulationControl::default();
    let (id, metrics) =
        run_election(&control, 1, Topology::Ring, SimulationParameters::default()).await;

    assert!(metrics.converged);
    assert_eq!(metrics.leader_id, Some(NodeId::indexed(0)));
    assert_eq!(metrics.message_count, 0, "a singleton has nobody to talk to");
    control.stop_simulation(id).await.expect("stop");
}
