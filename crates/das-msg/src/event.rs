//! ---
//! das_section: "01-identity-wire-types"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node identities, message schema, and event types."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Classification of observability events fanned out on the bus.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// The middleware accepted a message for transmission.
    MessageSent,
    /// A message was delivered to a registered handler.
    MessageReceived,
    /// A node moved through its lifecycle state machine.
    StateChanged,
    /// Every node agrees on the maximum numeric id.
    LeaderElected,
    /// A message was dropped or an operation failed.
    Error,
    /// Periodic engine round marker.
    MetricsUpdate,
}

/// Node lifecycle states observed through `STATE_CHANGED` events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRunState {
    /// The node exists but its algorithm has not started.
    Initialized,
    /// The algorithm's `on_start` has fired.
    Running,
    /// The simulation hosting the node was stopped.
    Stopped,
}

/// One significant action, as published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationEvent {
    /// Wall-clock time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Node the event concerns.
    pub node_id: NodeId,
    /// Peer involved, for peer-to-peer events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<NodeId>,
    /// Short human-readable description.
    pub payload_summary: String,
}

impl SimulationEvent {
    fn now(
        event_type: EventType,
        node_id: NodeId,
        peer_id: Option<NodeId>,
        payload_summary: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            node_id,
            peer_id,
            payload_summary: payload_summary.into(),
        }
    }

    /// The middleware accepted a message from `sender` towards `receiver`.
    pub fn message_sent(sender: NodeId, receiver: NodeId, summary: impl Into<String>) -> Self {
        Self::now(EventType::MessageSent, sender, Some(receiver), summary)
    }

    /// A message from `sender` was delivered to `receiver`'s handler.
    pub fn message_received(receiver: NodeId, sender: NodeId, summary: impl Into<String>) -> Self {
        Self::now(EventType::MessageReceived, receiver, Some(sender), summary)
    }

    /// A node entered `state`.
    pub fn state_changed(node_id: NodeId, state: NodeRunState) -> Self {
        Self::now(EventType::StateChanged, node_id, None, state.to_string())
    }

    /// Convergence was observed; `leader` is the agreed maximum id.
    pub fn leader_elected(leader: NodeId) -> Self {
        let summary = format!("leader={leader}");
        Self::now(EventType::LeaderElected, leader, None, summary)
    }

    /// Something was dropped or failed; `cause` identifies why.
    pub fn error(node_id: NodeId, cause: impl Into<String>) -> Self {
        Self::now(EventType::Error, node_id, None, cause)
    }

    /// Periodic engine round marker.
    pub fn metrics_update(node_id: NodeId, summary: impl Into<String>) -> Self {
        Self::now(EventType::MetricsUpdate, node_id, None, summary)
    }

    /// Render the canonical log line:
    /// `"[timestamp][TYPE] nodeId[->peerId]: summary"`.
    pub fn format_log_line(&self) -> String {
        match &self.peer_id {
            Some(peer) => format!(
                "[{}][{}] {}->{}: {}",
                self.timestamp.to_rfc3339(),
                self.event_type,
                self.node_id,
                peer,
                self.payload_summary
            ),
            None => format!(
                "[{}][{}] {}: {}",
                self.timestamp.to_rfc3339(),
                self.event_type,
                self.node_id,
                self.payload_summary
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_type_names_are_screaming_snake() {
        assert_eq!(EventType::MessageSent.to_string(), "MESSAGE_SENT");
        assert_eq!(
            EventType::from_str("LEADER_ELECTED").unwrap(),
            EventType::LeaderElected
        );
    }

    #[test]
    fn log_line_includes_peer_when_present() {
        let event =
            SimulationEvent::message_sent(NodeId::indexed(0), NodeId::indexed(1), "PING seq=1");
        let line = event.format_log_line();
        assert!(line.contains("[MESSAGE_SENT] node-0->node-1: PING seq=1"));

        let state = SimulationEvent::state_changed(NodeId::indexed(2), NodeRunState::Running);
        assert!(state.format_log_line().ends_with("node-2: RUNNING"));
    }

    #[test]
    fn serde_uses_camel_case_keys() {
        let event = SimulationEvent::error(NodeId::indexed(0), "queue full");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["nodeId"], "node-0");
        assert_eq!(value["payloadSummary"], "queue full");
        assert!(value.get("peerId").is_none());
    }
}
