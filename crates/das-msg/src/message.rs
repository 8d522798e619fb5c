//! ---
//! das_section: "01-identity-wire-types"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node identities, message schema, and event types."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{MsgError, NodeId, Result};

/// Peer-to-peer message carried by the messaging middleware.
///
/// The wire format is JSON. Unknown fields are ignored on decode; a
/// datagram missing one of the required fields fails [`decode`] and is
/// dropped by the transport.
///
/// [`decode`]: SimulationMessage::decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMessage {
    /// Originating node.
    pub sender: NodeId,
    /// Destination node.
    pub receiver: NodeId,
    /// Application-level message type; must be non-blank.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    /// Optional sender-assigned sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl SimulationMessage {
    /// Construct a message with no payload or sequence number.
    pub fn new(sender: NodeId, receiver: NodeId, message_type: impl Into<String>) -> Self {
        Self {
            sender,
            receiver,
            message_type: message_type.into(),
            payload: None,
            seq: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach a sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Check the required-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.message_type.trim().is_empty() {
            return Err(MsgError::BlankMessageType);
        }
        if self.sender.as_str().trim().is_empty() || self.receiver.as_str().trim().is_empty() {
            return Err(MsgError::BlankNodeId);
        }
        Ok(())
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the JSON wire form, enforcing required fields.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let message: Self = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    /// Short human-readable description used in observability events.
    pub fn summary(&self) -> String {
        match self.seq {
            Some(seq) => format!("{} seq={seq}", self.message_type),
            None => self.message_type.clone(),
        }
    }
}
