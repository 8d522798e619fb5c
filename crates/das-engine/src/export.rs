//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::str::FromStr;

use das_msg::{MetricsSnapshot, SimulationEvent};
use serde_json::json;

use crate::{EngineError, Result};

/// Supported run data export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ExportFormat {
    /// One JSON document: `{"events": [...], "metrics": {...}}`.
    Json,
    /// Two CSV sections with fixed header rows.
    Csv,
}

impl ExportFormat {
    /// Parse a format name case-insensitively; unknown names are rejected.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| EngineError::BadFormat(name.to_owned()))
    }
}

/// Render recorded events and the current metrics in `format`.
pub fn render(
    format: ExportFormat,
    events: &[SimulationEvent],
    metrics: &MetricsSnapshot,
) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            let document = json!({ "events": events, "metrics": metrics });
            serde_json::to_vec_pretty(&document)
                .map_err(|err| EngineError::InvalidConfig(format!("export serialization: {err}")))
        }
        ExportFormat::Csv => Ok(render_csv(events, metrics).into_bytes()),
    }
}

fn render_csv(events: &[SimulationEvent], metrics: &MetricsSnapshot) -> String {
    let mut out = String::new();
    out.push_str("=== EVENTS ===\n");
    out.push_str("timestamp,type,nodeId,peerId,payloadSummary\n");
    for event in events {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            event.timestamp.to_rfc3339(),
            event.event_type,
            csv_field(event.node_id.as_str()),
            csv_field(
                event
                    .peer_id
                    .as_ref()
                    .map(|peer| peer.as_str())
                    .unwrap_or_default()
            ),
            csv_field(&event.payload_summary),
        ));
    }
    out.push_str("=== METRICS ===\n");
    out.push_str("simulatedTime,realTimeMillis,messageCount,rounds,converged,leaderId\n");
    out.push_str(&format!(
        "{},{},{},{},{},{}\n",
        metrics.simulated_time,
        metrics.real_time_millis,
        metrics.message_count,
        metrics.rounds,
        metrics.converged,
        csv_field(
            metrics
                .leader_id
                .as_ref()
                .map(|leader| leader.as_str())
                .unwrap_or_default()
        ),
    ));
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
