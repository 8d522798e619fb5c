//! ---
//! das_section: "03-messaging-middleware"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Messaging middleware port facade and transports."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use das_bus::EventBus;
use das_common::{FaultConfig, OverflowPolicy, QueueConfig};
use das_msg::{NodeId, SimulationEvent, SimulationMessage};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::port::{MessageHandler, MessagingPort};
use crate::queue::{BoundedQueue, EnqueueOutcome};

/// Encoded message plus routing metadata. The payload bytes are opaque to
/// the router; decoding happens only at delivery, which is what preserves
/// the JSON serialization boundary.
#[derive(Debug, Clone)]
struct Datagram {
    sender: NodeId,
    receiver: NodeId,
    bytes: Vec<u8>,
}

struct Inbox {
    queue: BoundedQueue<Datagram>,
    draining: AtomicBool,
}

/// Fault sampling state. Faults are sampled per datagram in a fixed order:
/// drop, duplicate, reorder holdback, delay. The holdback buffer releases
/// one random entry whenever it exceeds the window and is flushed in
/// shuffled order when the router goes idle.
struct FaultState {
    config: FaultConfig,
    rng: StdRng,
    holdback: VecDeque<Datagram>,
}

impl FaultState {
    fn new(config: FaultConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            holdback: VecDeque::new(),
        }
    }

    fn sample_drop(&mut self) -> bool {
        self.config.drop_probability > 0.0 && self.rng.gen::<f64>() < self.config.drop_probability
    }

    fn sample_duplicate(&mut self) -> bool {
        self.config.duplicate_probability > 0.0
            && self.rng.gen::<f64>() < self.config.duplicate_probability
    }

    fn sample_delay(&mut self) -> u64 {
        if self.config.delay_max_ms == 0 {
            return 0;
        }
        self.rng
            .gen_range(self.config.delay_min_ms..=self.config.delay_max_ms)
    }
}

struct VirtualInner {
    bus: EventBus,
    queues: QueueConfig,
    outbound: BoundedQueue<Datagram>,
    outbound_signal: Notify,
    handlers: RwLock<HashMap<NodeId, MessageHandler>>,
    inboxes: RwLock<HashMap<NodeId, Arc<Inbox>>>,
    faults: Mutex<FaultState>,
    shutdown: AtomicBool,
    router: Mutex<Option<JoinHandle<()>>>,
}

/// In-process transport preserving distributed semantics.
///
/// One instance per simulation; there is no global registry, so concurrent
/// simulations cannot leak messages into each other. Delivery is always
/// asynchronous: `send` enqueues and a router task moves datagrams into
/// per-receiver inboxes, each drained serially by at most one worker at a
/// time.
#[derive(Clone)]
pub struct VirtualNetwork {
    inner: Arc<VirtualInner>,
}

impl VirtualNetwork {
    /// Spawn the router for a new virtual network.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(bus: EventBus, queues: QueueConfig, faults: FaultConfig) -> Self {
        let inner = Arc::new(VirtualInner {
            bus,
            queues,
            outbound: BoundedQueue::new(
                queues.out_capacity,
                queues.overflow_policy,
                Duration::from_millis(queues.block_timeout_ms),
            ),
            outbound_signal: Notify::new(),
            handlers: RwLock::new(HashMap::new()),
            inboxes: RwLock::new(HashMap::new()),
            faults: Mutex::new(FaultState::new(faults)),
            shutdown: AtomicBool::new(false),
            router: Mutex::new(None),
        });
        let router = tokio::spawn(run_router(inner.clone()));
        *inner.router.lock() = Some(router);
        Self { inner }
    }
}

async fn run_router(inner: Arc<VirtualInner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match inner.outbound.pop() {
            Some(datagram) => inner.route(datagram),
            None => {
                inner.flush_holdback();
                inner.outbound_signal.notified().await;
            }
        }
    }
    debug!("virtual router stopped");
}

impl VirtualInner {
    fn emit_error(&self, node: NodeId, cause: String) {
        self.bus.publish(&SimulationEvent::error(node, cause));
    }

    /// Apply fault sampling and move the datagram towards its inbox.
    fn route(self: &Arc<Self>, datagram: Datagram) {
        let mut releases: Vec<(Datagram, u64)> = Vec::with_capacity(2);
        {
            let mut guard = self.faults.lock();
            let faults = &mut *guard;
            if faults.sample_drop() {
                drop(guard);
                trace!(sender = %datagram.sender, receiver = %datagram.receiver, "injected drop");
                self.emit_error(datagram.sender, "injected drop".to_owned());
                return;
            }
            let mut copies = vec![datagram.clone()];
            if faults.sample_duplicate() {
                copies.push(datagram);
            }
            for copy in copies {
                let released = if faults.config.reorder_window > 0 {
                    faults.holdback.push_back(copy);
                    if faults.holdback.len() > faults.config.reorder_window {
                        let index = faults.rng.gen_range(0..faults.holdback.len());
                        faults.holdback.remove(index)
                    } else {
                        None
                    }
                } else {
                    Some(copy)
                };
                if let Some(released) = released {
                    let delay = faults.sample_delay();
                    releases.push((released, delay));
                }
            }
        }
        for (datagram, delay_ms) in releases {
            self.dispatch(datagram, delay_ms);
        }
    }

    /// Release everything held for reordering, in shuffled order.
    fn flush_holdback(self: &Arc<Self>) {
        let mut releases = Vec::new();
        {
            let mut guard = self.faults.lock();
            let faults = &mut *guard;
            while !faults.holdback.is_empty() {
                let index = faults.rng.gen_range(0..faults.holdback.len());
                let datagram = faults.holdback.remove(index).expect("index in range");
                let delay = faults.sample_delay();
                releases.push((datagram, delay));
            }
        }
        for (datagram, delay_ms) in releases {
            self.dispatch(datagram, delay_ms);
        }
    }

    fn dispatch(self: &Arc<Self>, datagram: Datagram, delay_ms: u64) {
        if delay_ms == 0 {
            self.deliver_to_inbox(datagram);
            return;
        }
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if !inner.shutdown.load(Ordering::SeqCst) {
                inner.deliver_to_inbox(datagram);
            }
        });
    }

    fn deliver_to_inbox(self: &Arc<Self>, datagram: Datagram) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let receiver = datagram.receiver.clone();
        let inbox = {
            let mut inboxes = self.inboxes.write();
            inboxes
                .entry(receiver.clone())
                .or_insert_with(|| {
                    Arc::new(Inbox {
                        queue: BoundedQueue::new(
                            self.queues.in_capacity,
                            self.queues.overflow_policy,
                            Duration::from_millis(self.queues.block_timeout_ms),
                        ),
                        draining: AtomicBool::new(false),
                    })
                })
                .clone()
        };
        match inbox.queue.push(datagram) {
            EnqueueOutcome::Accepted => {}
            EnqueueOutcome::Displaced(old) => {
                self.emit_error(old.sender, "inbox full (dropped oldest)".to_owned());
            }
            EnqueueOutcome::Rejected(rejected) => {
                let cause = match self.queues.overflow_policy {
                    OverflowPolicy::Block => "inbox enqueue timeout",
                    _ => "inbox full",
                };
                self.emit_error(rejected.sender, cause.to_owned());
                return;
            }
        }
        self.arm_drain(receiver, inbox);
    }

    /// Start a drain worker unless one is already running for this inbox.
    /// Serial per-receiver delivery follows from the `draining` flag: at
    /// most one worker owns the inbox at a time.
    fn arm_drain(self: &Arc<Self>, node: NodeId, inbox: Arc<Inbox>) {
        if inbox.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.clone();
        tokio::spawn(async move {
            loop {
                while let Some(datagram) = inbox.queue.pop() {
                    inner.deliver(&node, datagram);
                }
                inbox.draining.store(false, Ordering::SeqCst);
                // re-arm if an arrival raced the disarm
                if inbox.queue.is_empty() || inbox.draining.swap(true, Ordering::SeqCst) {
                    break;
                }
            }
        });
    }

    /// Final delivery: decode across the JSON boundary, validate, and hand
    /// the message to the registered handler.
    fn deliver(&self, node: &NodeId, datagram: Datagram) {
        let message = match SimulationMessage::decode(&datagram.bytes) {
            Ok(message) => message,
            Err(err) => {
                self.emit_error(node.clone(), format!("decode failure: {err}"));
                return;
            }
        };
        if message.receiver != *node {
            self.emit_error(
                node.clone(),
                format!("receiver mismatch on delivery: {}", message.receiver),
            );
            return;
        }
        let handler = self.handlers.read().get(node).cloned();
        let Some(handler) = handler else {
            self.emit_error(node.clone(), format!("no handler for {node}"));
            return;
        };
        let sender = message.sender.clone();
        let summary = message.summary();
        if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
            self.emit_error(node.clone(), "handler panic".to_owned());
            return;
        }
        self.bus
            .publish(&SimulationEvent::message_received(node.clone(), sender, summary));
    }
}

impl MessagingPort for VirtualNetwork {
    fn send(&self, receiver: &NodeId, message: SimulationMessage) -> bool {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if message.receiver != *receiver {
            self.inner.emit_error(
                message.sender.clone(),
                format!(
                    "receiver mismatch: addressed {} but message names {}",
                    receiver, message.receiver
                ),
            );
            return false;
        }
        if let Err(err) = message.validate() {
            self.inner
                .emit_error(message.sender.clone(), format!("invalid message: {err}"));
            return false;
        }
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.inner
                    .emit_error(message.sender.clone(), format!("encode failure: {err}"));
                return false;
            }
        };
        let summary = message.summary();
        let datagram = Datagram {
            sender: message.sender.clone(),
            receiver: receiver.clone(),
            bytes,
        };
        match self.inner.outbound.push(datagram) {
            EnqueueOutcome::Accepted => {}
            EnqueueOutcome::Displaced(old) => {
                self.inner
                    .emit_error(old.sender, "outbox full (dropped oldest)".to_owned());
            }
            EnqueueOutcome::Rejected(_) => {
                let cause = match self.inner.queues.overflow_policy {
                    OverflowPolicy::Block => "outbox enqueue timeout",
                    _ => "outbox full",
                };
                self.inner.emit_error(message.sender.clone(), cause.to_owned());
                return false;
            }
        }
        self.inner.bus.publish(&SimulationEvent::message_sent(
            message.sender,
            receiver.clone(),
            summary,
        ));
        self.inner.outbound_signal.notify_one();
        true
    }

    fn register_handler(&self, node: NodeId, handler: MessageHandler) {
        self.inner.handlers.write().insert(node, handler);
    }

    fn unregister_handler(&self, node: &NodeId) {
        self.inner.handlers.write().remove(node);
    }

    fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.outbound_signal.notify_one();
        if let Some(router) = self.inner.router.lock().take() {
            router.abort();
        }
        self.inner.outbound.close();
        let inboxes: Vec<Arc<Inbox>> = self.inner.inboxes.write().drain().map(|(_, i)| i).collect();
        for inbox in inboxes {
            inbox.queue.close();
        }
        self.inner.handlers.write().clear();
        debug!("virtual network shut down");
    }

    fn name(&self) -> &'static str {
        "virtual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use das_msg::EventType;
    use serde_json::json;
    use std::time::Instant;

    fn network(bus: &EventBus) -> VirtualNetwork {
        VirtualNetwork::spawn(bus.clone(), QueueConfig::default(), FaultConfig::default())
    }

    fn message(from: u64, to: u64, message_type: &str) -> SimulationMessage {
        SimulationMessage::new(NodeId::indexed(from), NodeId::indexed(to), message_type)
    }

    async fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn send_delivers_through_json_boundary() {
        let bus = EventBus::new();
        let net = network(&bus);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        net.register_handler(
            NodeId::indexed(1),
            Arc::new(move |message| sink.lock().push(message)),
        );

        let sent = message(0, 1, "PING").with_payload(json!({"hop": 1})).with_seq(9);
        assert!(net.send(&NodeId::indexed(1), sent.clone()));

        assert!(wait_until(1000, || !received.lock().is_empty()).await);
        let delivered = received.lock()[0].clone();
        assert_eq!(delivered, sent, "fields must equal the JSON roundtrip form");
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn receiver_mismatch_is_rejected_with_error_event() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        bus.subscribe(
            EventType::Error,
            Arc::new(move |event| sink.lock().push(event.payload_summary.clone())),
        );
        let sent_events = Arc::new(Mutex::new(0usize));
        let sent_sink = sent_events.clone();
        bus.subscribe(EventType::MessageSent, Arc::new(move |_| *sent_sink.lock() += 1));

        let net = network(&bus);
        let accepted = net.send(&NodeId::indexed(2), message(0, 1, "PING"));
        assert!(!accepted);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("receiver mismatch"));
        assert_eq!(*sent_events.lock(), 0);
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_handler_drops_with_error() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        bus.subscribe(
            EventType::Error,
            Arc::new(move |event| sink.lock().push(event.payload_summary.clone())),
        );
        let net = network(&bus);

        assert!(net.send(&NodeId::indexed(5), message(0, 5, "PING")));
        assert!(
            wait_until(1000, || !errors.lock().is_empty()).await,
            "undeliverable message should surface as ERROR"
        );
        assert!(errors.lock()[0].contains("no handler"));
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handler_panic_is_isolated() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        bus.subscribe(
            EventType::Error,
            Arc::new(move |event| sink.lock().push(event.payload_summary.clone())),
        );
        let net = network(&bus);
        net.register_handler(NodeId::indexed(1), Arc::new(|_| panic!("bad handler")));

        assert!(net.send(&NodeId::indexed(1), message(0, 1, "PING")));
        assert!(wait_until(1000, || !errors.lock().is_empty()).await);
        assert!(errors.lock()[0].contains("handler panic"));

        // the transport loop survives: a healthy handler still works
        let delivered = Arc::new(Mutex::new(false));
        let flag = delivered.clone();
        net.register_handler(NodeId::indexed(2), Arc::new(move |_| *flag.lock() = true));
        assert!(net.send(&NodeId::indexed(2), message(0, 2, "PING")));
        assert!(wait_until(1000, || *delivered.lock()).await);
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serial_delivery_per_receiver() {
        let bus = EventBus::new();
        let net = network(&bus);
        let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handler = {
            let in_flight = in_flight.clone();
            let overlap = overlap.clone();
            let seen = seen.clone();
            Arc::new(move |_message: SimulationMessage| {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        net.register_handler(NodeId::indexed(9), handler);

        for i in 0..20 {
            assert!(net.send(
                &NodeId::indexed(9),
                message(0, 9, "PING").with_seq(i as u64)
            ));
        }
        assert!(wait_until(3000, || seen.load(Ordering::SeqCst) == 20).await);
        assert!(!overlap.load(Ordering::SeqCst), "deliveries overlapped");
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn injected_delay_defers_delivery() {
        let bus = EventBus::new();
        let faults = FaultConfig {
            delay_min_ms: 30,
            delay_max_ms: 40,
            ..FaultConfig::default()
        };
        let net = VirtualNetwork::spawn(bus, QueueConfig::default(), faults);
        let received_at = Arc::new(Mutex::new(None));
        let sink = received_at.clone();
        net.register_handler(
            NodeId::indexed(1),
            Arc::new(move |_| *sink.lock() = Some(Instant::now())),
        );

        let sent_at = Instant::now();
        assert!(net.send(&NodeId::indexed(1), message(0, 1, "PING")));
        assert!(wait_until(2000, || received_at.lock().is_some()).await);
        let elapsed = received_at.lock().expect("set") - sent_at;
        assert!(elapsed >= Duration::from_millis(30), "elapsed {elapsed:?}");
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_drop_probability_loses_everything() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        bus.subscribe(
            EventType::Error,
            Arc::new(move |event| sink.lock().push(event.payload_summary.clone())),
        );
        let faults = FaultConfig {
            drop_probability: 1.0,
            ..FaultConfig::default()
        };
        let net = VirtualNetwork::spawn(bus, QueueConfig::default(), faults);
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = delivered.clone();
        net.register_handler(
            NodeId::indexed(1),
            Arc::new(move |_| flag.store(true, Ordering::SeqCst)),
        );

        for i in 0..10 {
            assert!(
                net.send(&NodeId::indexed(1), message(0, 1, "PING").with_seq(i)),
                "send is still accepted; the loss happens inside the transport"
            );
        }
        assert!(wait_until(1000, || errors.lock().len() == 10).await);
        assert!(errors.lock().iter().all(|cause| cause.contains("injected drop")));
        assert!(!delivered.load(Ordering::SeqCst));
        net.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reorder_holdback_still_delivers_everything() {
        let bus = EventBus::new();
        let faults = FaultConfig {
            reorder_window: 4,
            seed: 7,
            ..FaultConfig::default()
        };
        let net = VirtualNetwork::spawn(bus, QueueConfig::default(), faults);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        net.register_handler(
            NodeId::indexed(1),
            Arc::new(move |message| sink.lock().push(message.seq.expect("seq set"))),
        );

        for i in 0..16u64 {
            assert!(net.send(&NodeId::indexed(1), message(0, 1, "PING").with_seq(i)));
        }
        assert!(wait_until(2000, || seen.lock().len() == 16).await);
        let mut delivered = seen.lock().clone();
        delivered.sort_unstable();
        assert_eq!(delivered, (0..16).collect::<Vec<_>>());
        net.shutdown();
    }
}
