//! ---
//! das_section: "01-identity-wire-types"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Node identities, message schema, and event types."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MsgError, Result};

/// Opaque node identity.
///
/// Identity equality is plain string equality. The derived `Ord` is
/// lexicographic and exists so ids can key ordered maps; leader-style
/// comparisons must go through [`NodeId::cmp_numeric`], which orders by the
/// trailing integer suffix (`node-2 < node-10`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Construct a node id from an arbitrary non-blank string.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(MsgError::BlankNodeId);
        }
        Ok(Self(id))
    }

    /// Construct the conventional `node-<index>` identity.
    pub fn indexed(index: u64) -> Self {
        Self(format!("node-{index}"))
    }

    /// Borrow the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the trailing decimal suffix, if any.
    ///
    /// `node-10` yields `Some(10)`; an id without trailing digits yields
    /// `None`.
    pub fn node_index(&self) -> Option<u64> {
        let digits = self
            .0
            .rfind(|c: char| !c.is_ascii_digit())
            .map(|pos| &self.0[pos + 1..])
            .unwrap_or(&self.0);
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    }

    /// Order two ids by their numeric suffix.
    ///
    /// Ids with a suffix sort above ids without one; suffix ties and
    /// suffix-less pairs fall back to lexicographic comparison so the
    /// ordering stays total.
    pub fn cmp_numeric(&self, other: &Self) -> Ordering {
        match (self.node_index(), other.node_index()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = MsgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Opaque simulation identity, fresh for every created simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationId(Uuid);

impl SimulationId {
    /// Mint a fresh simulation id.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a previously issued token.
    pub fn parse(token: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(token)?))
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
