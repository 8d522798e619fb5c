//! ---
//! das_section: "01-identity-wire-types"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node identities, message schema, and event types."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Identity and wire types shared across the DAS workspace.
//!
//! Everything that crosses a transport or the event bus is defined here:
//! node identities, the peer-to-peer message schema, observability events,
//! and the snapshot value types handed out to callers.

pub mod event;
pub mod id;
pub mod message;
pub mod snapshot;

/// Shared result type for wire-level operations.
pub type Result<T> = std::result::Result<T, MsgError>;

/// Errors raised while constructing or decoding wire types.
#[derive(Debug, thiserror::Error)]
pub enum MsgError {
    /// A node identity was empty or whitespace-only.
    #[error("node id must not be blank")]
    BlankNodeId,
    /// A message carried an empty `type` field.
    #[error("message type must not be blank")]
    BlankMessageType,
    /// A simulation id token could not be parsed.
    #[error("invalid simulation id: {0}")]
    InvalidSimulationId(#[from] uuid::Error),
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use event::{EventType, NodeRunState, SimulationEvent};
pub use id::{NodeId, SimulationId};
pub use message::SimulationMessage;
pub use snapshot::{MetricsSnapshot, NodeView, VisualizationSnapshot};
