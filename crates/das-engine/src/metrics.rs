//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use das_bus::EventBus;
use das_msg::{EventType, MetricsSnapshot, NodeId};
use parking_lot::Mutex;

/// Aggregates bus events into a [`MetricsSnapshot`].
///
/// Counters are atomics so aggregation never blocks a publisher. Counters
/// only ever increase while the simulation runs; `real_time_millis` is
/// frozen at stop.
#[derive(Clone, Default)]
pub struct MetricsAggregator {
    inner: Arc<AggregatorInner>,
}

#[derive(Default)]
struct AggregatorInner {
    message_count: AtomicU64,
    rounds: AtomicU64,
    converged: AtomicBool,
    leader: Mutex<Option<NodeId>>,
    started_at: Mutex<Option<Instant>>,
    running: AtomicBool,
    frozen_real_time: AtomicU64,
}

impl MetricsAggregator {
    /// A fresh aggregator with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the events the aggregator counts: `MESSAGE_SENT`,
    /// `LEADER_ELECTED`, and the per-round `METRICS_UPDATE` marker.
    pub fn attach(&self, bus: &EventBus) {
        let inner = self.inner.clone();
        bus.subscribe(
            EventType::MessageSent,
            Arc::new(move |_| {
                inner.message_count.fetch_add(1, Ordering::Relaxed);
            }),
        );
        let inner = self.inner.clone();
        bus.subscribe(
            EventType::LeaderElected,
            Arc::new(move |event| {
                *inner.leader.lock() = Some(event.node_id.clone());
                inner.converged.store(true, Ordering::SeqCst);
            }),
        );
        let inner = self.inner.clone();
        bus.subscribe(
            EventType::MetricsUpdate,
            Arc::new(move |_| {
                inner.rounds.fetch_add(1, Ordering::Relaxed);
            }),
        );
    }

    /// Record the run's wall-clock start.
    pub fn mark_started(&self) {
        *self.inner.started_at.lock() = Some(Instant::now());
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// Freeze `real_time_millis` at its current value.
    pub fn freeze(&self) {
        let elapsed = self.elapsed_millis();
        self.inner.frozen_real_time.store(elapsed, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn elapsed_millis(&self) -> u64 {
        if !self.inner.running.load(Ordering::SeqCst) {
            return self.inner.frozen_real_time.load(Ordering::SeqCst);
        }
        self.inner
            .started_at
            .lock()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Rounds driven so far.
    pub fn rounds(&self) -> u64 {
        self.inner.rounds.load(Ordering::Relaxed)
    }

    /// Whether convergence was observed.
    pub fn converged(&self) -> bool {
        self.inner.converged.load(Ordering::SeqCst)
    }

    /// The elected leader, once converged.
    pub fn leader(&self) -> Option<NodeId> {
        self.inner.leader.lock().clone()
    }

    /// Current snapshot; cheap and lock-light.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let rounds = self.rounds();
        MetricsSnapshot {
            simulated_time: rounds,
            real_time_millis: self.elapsed_millis(),
            message_count: self.inner.message_count.load(Ordering::Relaxed),
            rounds,
            converged: self.converged(),
            leader_id: self.leader(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_msg::SimulationEvent;

    #[test]
    fn fresh_aggregator_reports_zero() {
        let aggregator = MetricsAggregator::new();
        assert_eq!(aggregator.snapshot(), MetricsSnapshot::zero());
    }

    #[test]
    fn bus_events_move_the_counters() {
        let bus = EventBus::new();
        let aggregator = MetricsAggregator::new();
        aggregator.attach(&bus);

        for i in 0..3 {
            bus.publish(&SimulationEvent::message_sent(
                NodeId::indexed(0),
                NodeId::indexed(1),
                format!("PING seq={i}"),
            ));
        }
        bus.publish(&SimulationEvent::metrics_update(
            NodeId::new("engine").unwrap(),
            "round=1",
        ));
        bus.publish(&SimulationEvent::leader_elected(NodeId::indexed(4)));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.message_count, 3);
        assert_eq!(snapshot.rounds, 1);
        assert!(snapshot.converged);
        assert_eq!(snapshot.leader_id, Some(NodeId::indexed(4)));
    }

    #[test]
    fn freeze_pins_real_time() {
        let aggregator = MetricsAggregator::new();
        aggregator.mark_started();
        std::thread::sleep(std::time::Duration::from_millis(5));
        aggregator.freeze();
        let first = aggregator.snapshot().real_time_millis;
        assert!(first >= 5);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(aggregator.snapshot().real_time_millis, first);
    }
}
