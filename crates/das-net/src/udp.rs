//! ---
//! das_section: "03-messaging-middleware"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Messaging middleware port facade and transports."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use das_bus::EventBus;
use das_common::{OverflowPolicy, QueueConfig};
use das_msg::{NodeId, SimulationEvent, SimulationMessage};
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::port::{MessageHandler, MessagingPort};
use crate::queue::{BoundedQueue, EnqueueOutcome};
use crate::resolver::PeerResolver;
use crate::{NetError, Result};

/// Hard ceiling on a UDP payload (65,535 minus IP and UDP headers).
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

struct OutboundDatagram {
    receiver: NodeId,
    bytes: Vec<u8>,
}

struct UdpInner {
    local: NodeId,
    bus: EventBus,
    socket: Arc<UdpSocket>,
    resolver: PeerResolver,
    queues: QueueConfig,
    outbound: BoundedQueue<OutboundDatagram>,
    outbound_signal: Notify,
    inbound: BoundedQueue<Vec<u8>>,
    inbound_signal: Notify,
    handlers: RwLock<HashMap<NodeId, MessageHandler>>,
    shutdown: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One-endpoint-per-process datagram transport.
///
/// Binds `0.0.0.0:<port>` so the endpoint is reachable inside containers,
/// and runs three tasks: socket receive, inbound delivery, and outbound
/// send. Peer addresses come from the [`PeerResolver`]; hostnames are
/// resolved per send, which makes `NodeId`-as-hostname deployments work
/// without extra wiring.
#[derive(Clone)]
pub struct UdpEndpoint {
    inner: Arc<UdpInner>,
}

impl UdpEndpoint {
    /// Bind the endpoint socket and start its worker tasks.
    ///
    /// A bind failure is fatal to the endpoint and surfaces as
    /// [`NetError::Bind`]; everything after a successful bind is
    /// best-effort.
    pub async fn bind(
        local: NodeId,
        port: u16,
        resolver: PeerResolver,
        bus: EventBus,
        queues: QueueConfig,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|source| NetError::Bind { port, source })?;
        info!(node_id = %local, port, "udp endpoint bound");
        let block_timeout = Duration::from_millis(queues.block_timeout_ms);
        let inner = Arc::new(UdpInner {
            local,
            bus,
            socket: Arc::new(socket),
            resolver,
            queues,
            outbound: BoundedQueue::new(queues.out_capacity, queues.overflow_policy, block_timeout),
            outbound_signal: Notify::new(),
            inbound: BoundedQueue::new(queues.in_capacity, queues.overflow_policy, block_timeout),
            inbound_signal: Notify::new(),
            handlers: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });
        let tasks = vec![
            tokio::spawn(recv_loop(inner.clone())),
            tokio::spawn(deliver_loop(inner.clone())),
            tokio::spawn(send_loop(inner.clone())),
        ];
        *inner.tasks.lock() = tasks;
        Ok(Self { inner })
    }

    /// The node identity this endpoint speaks for.
    pub fn local_id(&self) -> &NodeId {
        &self.inner.local
    }

    /// The locally bound port (useful when binding port 0 in tests).
    pub fn local_port(&self) -> u16 {
        self.inner
            .socket
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(0)
    }
}

async fn recv_loop(inner: Arc<UdpInner>) {
    let mut buf = vec![0u8; 65_535];
    loop {
        match inner.socket.recv_from(&mut buf).await {
            Ok((len, _remote)) => {
                match inner.inbound.push(buf[..len].to_vec()) {
                    EnqueueOutcome::Accepted => {}
                    EnqueueOutcome::Displaced(_) => {
                        inner.emit_error("inbox full (dropped oldest)".to_owned());
                    }
                    EnqueueOutcome::Rejected(_) => {
                        let cause = match inner.queues.overflow_policy {
                            OverflowPolicy::Block => "inbox enqueue timeout",
                            _ => "inbox full",
                        };
                        inner.emit_error(cause.to_owned());
                        continue;
                    }
                }
                inner.inbound_signal.notify_one();
            }
            Err(err) => {
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                warn!(node_id = %inner.local, error = %err, "udp receive failed");
                inner.emit_error(format!("socket error: {err}"));
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn deliver_loop(inner: Arc<UdpInner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match inner.inbound.pop() {
            Some(bytes) => inner.deliver(bytes),
            None => inner.inbound_signal.notified().await,
        }
    }
}

async fn send_loop(inner: Arc<UdpInner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match inner.outbound.pop() {
            Some(datagram) => {
                let Some((host, port)) = inner.resolver.resolve(&datagram.receiver) else {
                    inner.emit_error(format!("unknown receiver {}", datagram.receiver));
                    continue;
                };
                if let Err(err) = inner
                    .socket
                    .send_to(&datagram.bytes, (host.as_str(), port))
                    .await
                {
                    inner.emit_error(format!("socket error: {err}"));
                }
            }
            None => inner.outbound_signal.notified().await,
        }
    }
}

impl UdpInner {
    fn emit_error(&self, cause: String) {
        self.bus
            .publish(&SimulationEvent::error(self.local.clone(), cause));
    }

    /// Decode, validate, and deliver one inbound datagram.
    fn deliver(&self, bytes: Vec<u8>) {
        let message = match SimulationMessage::decode(&bytes) {
            Ok(message) => message,
            Err(err) => {
                self.emit_error(format!("decode failure: {err}"));
                return;
            }
        };
        if message.receiver != self.local {
            self.emit_error(format!(
                "receiver mismatch: datagram for {} arrived at {}",
                message.receiver, self.local
            ));
            return;
        }
        let handler = self.handlers.read().get(&self.local).cloned();
        let Some(handler) = handler else {
            self.emit_error(format!("no handler for {}", self.local));
            return;
        };
        let sender = message.sender.clone();
        let summary = message.summary();
        if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
            self.emit_error("handler panic".to_owned());
            return;
        }
        self.bus.publish(&SimulationEvent::message_received(
            self.local.clone(),
            sender,
            summary,
        ));
    }
}

impl MessagingPort for UdpEndpoint {
    fn send(&self, receiver: &NodeId, message: SimulationMessage) -> bool {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if message.receiver != *receiver {
            inner.emit_error(format!(
                "receiver mismatch: addressed {} but message names {}",
                receiver, message.receiver
            ));
            return false;
        }
        if message.sender != inner.local {
            inner.emit_error(format!(
                "sender mismatch: {} sending from endpoint {}",
                message.sender, inner.local
            ));
            return false;
        }
        if let Err(err) = message.validate() {
            inner.emit_error(format!("invalid message: {err}"));
            return false;
        }
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                inner.emit_error(format!("encode failure: {err}"));
                return false;
            }
        };
        if bytes.len() > MAX_DATAGRAM_BYTES {
            inner.emit_error(format!("oversize datagram ({} bytes)", bytes.len()));
            return false;
        }
        let summary = message.summary();
        match inner.outbound.push(OutboundDatagram {
            receiver: receiver.clone(),
            bytes,
        }) {
            EnqueueOutcome::Accepted => {}
            EnqueueOutcome::Displaced(_) => {
                inner.emit_error("outbox full (dropped oldest)".to_owned());
            }
            EnqueueOutcome::Rejected(_) => {
                let cause = match inner.queues.overflow_policy {
                    OverflowPolicy::Block => "outbox enqueue timeout",
                    _ => "outbox full",
                };
                inner.emit_error(cause.to_owned());
                return false;
            }
        }
        inner.bus.publish(&SimulationEvent::message_sent(
            message.sender,
            receiver.clone(),
            summary,
        ));
        inner.outbound_signal.notify_one();
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
        self.inner.inbound_signal.notify_one();
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.outbound.close();
        self.inner.inbound.close();
        self.inner.handlers.write().clear();
        debug!(node_id = %self.inner.local, "udp endpoint shut down");
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}
