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
use std::time::Duration;

use das_bus::EventBus;
use das_common::{FaultConfig, QueueConfig};
use das_msg::{NodeId, SimulationMessage};
use das_net::{MessagingPort, VirtualNetwork};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // One bus and one virtual network, as a simulation would own them.
    let bus = EventBus::new();
    bus.subscribe_all(Arc::new(|event| {
        println!("{}", event.format_log_line());
    }));
    let network = VirtualNetwork::spawn(bus, QueueConfig::default(), FaultConfig::default());

    // Node B echoes every ping back at node A.
    let network_for_b = network.clone();
    network.register_handler(
        NodeId::indexed(1),
        Arc::new(move |message| {
            let reply = SimulationMessage::new(NodeId::indexed(1), message.sender.clone(), "PONG")
                .with_payload(json!({"echo": message.summary()}));
            network_for_b.send(&message.sender, reply);
        }),
    );
    network.register_handler(NodeId::indexed(0), Arc::new(|_| {}));

    let ping = SimulationMessage::new(NodeId::indexed(0), NodeId::indexed(1), "PING").with_seq(1);
    assert!(network.send(&NodeId::indexed(1), ping));

    tokio::time::sleep(Duration::from_millis(100)).await;
    network.shutdown();
    Ok(())
}
