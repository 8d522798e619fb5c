//! ---
//! das_section: "05-simulation-engine"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Simulation engine lifecycle and aggregation."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::sync::Arc;

use das_bus::EventBus;
use das_msg::SimulationEvent;
use parking_lot::Mutex;

/// Records every bus event for the log view and run data export.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SimulationEvent>>>,
}

impl EventRecorder {
    /// A recorder with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the recorder to every event type on `bus`.
    pub fn attach(&self, bus: &EventBus) {
        let events = self.events.clone();
        bus.subscribe_all(Arc::new(move |event| {
            events.lock().push(event.clone());
        }));
    }

    /// All recorded events, sorted by timestamp ascending.
    pub fn events(&self) -> Vec<SimulationEvent> {
        let mut events = self.events.lock().clone();
        events.sort_by_key(|event| event.timestamp);
        events
    }

    /// Formatted log lines, optionally filtered.
    ///
    /// A non-empty filter matches case-insensitively against the type
    /// name, the node id, or the payload summary.
    pub fn logs(&self, filter: Option<&str>) -> Vec<String> {
        let needle = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);
        self.events()
            .iter()
            .filter(|event| match &needle {
                None => true,
                Some(needle) => {
                    event.event_type.to_string().to_lowercase().contains(needle)
                        || event.node_id.as_str().to_lowercase().contains(needle)
                        || event.payload_summary.to_lowercase().contains(needle)
                }
            })
            .map(SimulationEvent::format_log_line)
            .collect()
    }
}
