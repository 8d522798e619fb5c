//! ---
//! das_section: "03-messaging-middleware"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Messaging middleware port facade and transports."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::sync::Arc;

use das_msg::{NodeId, SimulationMessage};

/// Callback invoked with each message delivered to a node.
///
/// Handlers run on transport worker tasks and must not assume the sender's
/// thread. A panicking handler is isolated from the transport loop and
/// reported as an `ERROR` event.
pub type MessageHandler = Arc<dyn Fn(SimulationMessage) + Send + Sync>;

/// Stable messaging API, independent of the underlying transport.
///
/// All operations are safe under concurrent invocation. `send` never blocks
/// indefinitely: under the `BLOCK` overflow policy it waits at most the
/// configured timeout before rejecting.
pub trait MessagingPort: Send + Sync {
    /// Hand a message to the transport for best-effort delivery.
    ///
    /// Returns `true` iff the message was accepted (enqueued), which is
    /// also exactly when a `MESSAGE_SENT` event is emitted. Validation
    /// failure, unknown addresses, oversize datagrams, serialization
    /// failure, and queue rejection all return `false` and emit one
    /// `ERROR` event with the cause.
    fn send(&self, receiver: &NodeId, message: SimulationMessage) -> bool;

    /// Send `base` to each receiver, rewriting the `receiver` field per
    /// target. Failures are per-target; returns how many sends were
    /// accepted.
    fn broadcast(&self, receivers: &[NodeId], base: SimulationMessage) -> usize {
        receivers
            .iter()
            .filter(|receiver| {
                let mut message = base.clone();
                message.receiver = (*receiver).clone();
                self.send(receiver, message)
            })
            .count()
    }

    /// Route subsequent deliveries for `node` to `handler`.
    fn register_handler(&self, node: NodeId, handler: MessageHandler);

    /// Remove the handler for `node`; later deliveries drop with `ERROR`.
    fn unregister_handler(&self, node: &NodeId);

    /// Release the transport: stop worker tasks, close sockets, and discard
    /// queued messages. Completes in bounded time.
    fn shutdown(&self);

    /// Transport name for logging and metrics.
    fn name(&self) -> &'static str;
}
