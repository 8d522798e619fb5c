//! ---
//! das_section: "03-messaging-middleware"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Messaging middleware port facade and transports."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
//! Best-effort peer-to-peer messaging middleware.
//!
//! The [`MessagingPort`] trait is the stable API; two transports implement
//! it. [`VirtualNetwork`] is a per-simulation in-process router that pushes
//! every message through a JSON serialization boundary and can inject
//! faults. [`UdpEndpoint`] binds one datagram socket per process for
//! one-process-per-host deployments.
//!
//! Delivery is best-effort: messages may be lost, delayed, reordered, or
//! duplicated, and every drop is reported as an `ERROR` event on the bus.

pub mod port;
pub mod queue;
pub mod resolver;
pub mod udp;
pub mod virt;

/// Shared result type for middleware construction.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised while constructing transports.
///
/// Runtime failures (drops, overflow, socket errors after bind) are not
/// errors to the caller; they surface as `ERROR` events per the best-effort
/// contract.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The endpoint socket could not be bound; fatal to the endpoint.
    #[error("failed to bind udp endpoint on port {port}: {source}")]
    Bind {
        /// The requested port.
        port: u16,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// A `PEERS` entry did not match `id:host:port`.
    #[error("invalid peer spec entry {0:?}")]
    InvalidPeerSpec(String),
    /// The host template is missing the `{ID}` placeholder.
    #[error("host template {0:?} must contain {{ID}}")]
    InvalidHostTemplate(String),
    /// A UDP endpoint cannot exist without a local node identity.
    #[error("udp endpoint requires a node id")]
    MissingNodeId,
    /// Wire-type failure during construction.
    #[error(transparent)]
    Msg(#[from] das_msg::MsgError),
}

pub use port::{MessageHandler, MessagingPort};
pub use queue::{BoundedQueue, EnqueueOutcome};
pub use resolver::PeerResolver;
pub use udp::{UdpEndpoint, MAX_DATAGRAM_BYTES};
pub use virt::VirtualNetwork;
