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
use std::ops::RangeInclusive;

use das_common::UdpConfig;
use das_msg::NodeId;

use crate::{NetError, Result};

const ID_PLACEHOLDER: &str = "{ID}";

/// Maps node identities to `(host, port)` pairs for the UDP transport.
///
/// Two shapes exist: an explicit peer map assembled from a
/// comma-separated `id:host:port` spec, and a pattern where the host is a
/// template containing `{ID}` and the port is shared. Callers choose by the
/// presence of the explicit spec. Resolution returning `None` makes the
/// transport drop the message with an `ERROR` event; it is never fatal.
#[derive(Debug, Clone)]
pub enum PeerResolver {
    /// Fixed `id -> (host, port)` table.
    Explicit(HashMap<NodeId, (String, u16)>),
    /// Host template plus shared port, optionally bounded to a contiguous
    /// range of numeric node indices.
    Pattern {
        /// Template containing `{ID}`, replaced with the node id value.
        template: String,
        /// Shared destination port.
        port: u16,
        /// Permitted numeric indices; ids outside fail resolution.
        range: Option<RangeInclusive<u64>>,
    },
}

impl PeerResolver {
    /// Choose and build a resolver from the UDP configuration.
    pub fn from_config(config: &UdpConfig) -> Result<Self> {
        if let Some(spec) = &config.peers {
            return Ok(Self::Explicit(parse_peer_spec(spec)?));
        }
        let template = config
            .host_template
            .clone()
            .ok_or_else(|| NetError::InvalidHostTemplate(String::new()))?;
        if !template.contains(ID_PLACEHOLDER) {
            return Err(NetError::InvalidHostTemplate(template));
        }
        let range = config
            .node_count
            .map(|count| config.min_id..=config.min_id + count.saturating_sub(1));
        Ok(Self::Pattern {
            template,
            port: config.port,
            range,
        })
    }

    /// Resolve a node id to its datagram address, if known.
    pub fn resolve(&self, node: &NodeId) -> Option<(String, u16)> {
        match self {
            Self::Explicit(peers) => peers.get(node).cloned(),
            Self::Pattern {
                template,
                port,
                range,
            } => {
                if let Some(range) = range {
                    let index = node.node_index()?;
                    if !range.contains(&index) {
                        return None;
                    }
                }
                Some((template.replace(ID_PLACEHOLDER, node.as_str()), *port))
            }
        }
    }
}

/// Parse a `id:host:port,...` peer list.
fn parse_peer_spec(spec: &str) -> Result<HashMap<NodeId, (String, u16)>> {
    let mut peers = HashMap::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.splitn(3, ':');
        let (id, host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(host), Some(port)) => (id, host, port),
            _ => return Err(NetError::InvalidPeerSpec(entry.to_owned())),
        };
        let node = NodeId::new(id).map_err(|_| NetError::InvalidPeerSpec(entry.to_owned()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| NetError::InvalidPeerSpec(entry.to_owned()))?;
        if host.trim().is_empty() {
            return Err(NetError::InvalidPeerSpec(entry.to_owned()));
        }
        peers.insert(node, (host.to_owned(), port));
    }
    if peers.is_empty() {
        return Err(NetError::InvalidPeerSpec(spec.to_owned()));
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_spec_parses_and_resolves() {
        let config = UdpConfig {
            peers: Some("node-0:alpha.local:9000, node-1:beta.local:9001".to_owned()),
            ..UdpConfig::default()
        };
        let resolver = PeerResolver::from_config(&config).unwrap();
        assert_eq!(
            resolver.resolve(&NodeId::indexed(1)),
            Some(("beta.local".to_owned(), 9001))
        );
        assert_eq!(resolver.resolve(&NodeId::indexed(9)), None);
    }

    #[test]
    fn malformed_peer_entries_are_rejected() {
        for spec in ["node-0:alpha.local", "node-0::9000", "node-0:host:not-a-port", ""] {
            let config = UdpConfig {
                peers: Some(spec.to_owned()),
                ..UdpConfig::default()
            };
            assert!(
                PeerResolver::from_config(&config).is_err(),
                "spec {spec:?} should fail"
            );
        }
    }

    #[test]
    fn pattern_substitutes_the_node_id() {
        let config = UdpConfig {
            host_template: Some("{ID}.sim.svc.cluster.local".to_owned()),
            port: 9000,
            ..UdpConfig::default()
        };
        let resolver = PeerResolver::from_config(&config).unwrap();
        assert_eq!(
            resolver.resolve(&NodeId::indexed(4)),
            Some(("node-4.sim.svc.cluster.local".to_owned(), 9000))
        );
    }

    #[test]
    fn pattern_range_bounds_resolution() {
        let config = UdpConfig {
            host_template: Some("{ID}".to_owned()),
            node_count: Some(3),
            min_id: 1,
            ..UdpConfig::default()
        };
        let resolver = PeerResolver::from_config(&config).unwrap();
        assert!(resolver.resolve(&NodeId::indexed(1)).is_some());
        assert!(resolver.resolve(&NodeId::indexed(3)).is_some());
        assert!(resolver.resolve(&NodeId::indexed(0)).is_none());
        assert!(resolver.resolve(&NodeId::indexed(4)).is_none());
        assert!(
            resolver.resolve(&NodeId::new("gateway").unwrap()).is_none(),
            "ids without a numeric index cannot satisfy a bounded range"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let config = UdpConfig {
            host_template: Some("static-host".to_owned()),
            ..UdpConfig::default()
        };
        assert!(PeerResolver::from_config(&config).is_err());
    }
}
