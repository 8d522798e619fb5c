//! ---
//! das_section: "01-core-runtime"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Shared primitives and utilities for the DAS runtime."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::str::FromStr;

use serde::{Deserialize, Serialize};

fn default_queue_capacity() -> usize {
    1024
}

fn default_block_timeout_ms() -> u64 {
    100
}

fn default_udp_port() -> u16 {
    9000
}

fn default_fault_seed() -> u64 {
    42
}

/// Errors raised while assembling configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A recognized key held a value that could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// The offending environment key.
        key: &'static str,
        /// The raw value found.
        value: String,
    },
    /// A numeric value was outside its documented range.
    #[error("{key} out of range: {detail}")]
    OutOfRange {
        /// The offending environment key.
        key: &'static str,
        /// What the constraint was.
        detail: String,
    },
}

/// Which messaging transport the process uses.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MiddlewareMode {
    /// In-process router preserving distributed semantics.
    #[default]
    Virtual,
    /// One datagram endpoint per process.
    Udp,
}

/// What happens when a bounded queue is full.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OverflowPolicy {
    /// Reject the incoming item.
    #[default]
    DropNewest,
    /// Evict the oldest queued item to make room.
    DropOldest,
    /// Wait for room, at most `QUEUE_BLOCK_TIMEOUT_MS`, then reject.
    Block,
}

/// Capacities and overflow behaviour of the per-endpoint queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Outbound queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub out_capacity: usize,
    /// Inbound queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub in_capacity: usize,
    /// Shared overflow policy for both queues.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on the wait under [`OverflowPolicy::Block`].
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            out_capacity: default_queue_capacity(),
            in_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            block_timeout_ms: default_block_timeout_ms(),
        }
    }
}

/// Fault injection knobs for the virtual transport.
///
/// All faults default to off; the RNG seed defaults to 42 so runs are
/// reproducible unless explicitly varied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Probability in `[0,1]` that a datagram is silently lost.
    #[serde(default)]
    pub drop_probability: f64,
    /// Probability in `[0,1]` that a datagram is delivered twice.
    #[serde(default)]
    pub duplicate_probability: f64,
    /// Lower bound of the injected delivery delay, in milliseconds.
    #[serde(default)]
    pub delay_min_ms: u64,
    /// Upper bound of the injected delivery delay, in milliseconds.
    #[serde(default)]
    pub delay_max_ms: u64,
    /// Size of the reorder holdback buffer; 0 disables reordering.
    #[serde(default)]
    pub reorder_window: usize,
    /// Seed for the fault RNG.
    #[serde(default = "default_fault_seed")]
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            delay_min_ms: 0,
            delay_max_ms: 0,
            reorder_window: 0,
            seed: default_fault_seed(),
        }
    }
}

impl FaultConfig {
    /// Whether any fault is configured at all.
    pub fn is_active(&self) -> bool {
        self.drop_probability > 0.0
            || self.duplicate_probability > 0.0
            || self.delay_max_ms > 0
            || self.reorder_window > 0
    }
}

/// Identity and addressing of a UDP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// This process's node identity (`NODE_ID`).
    #[serde(default)]
    pub node_id: Option<String>,
    /// Shared datagram port (`UDP_PORT`).
    #[serde(default = "default_udp_port")]
    pub port: u16,
    /// Host pattern containing `{ID}` (`HOST_TEMPLATE`).
    #[serde(default)]
    pub host_template: Option<String>,
    /// Explicit peer list `id:host:port,...` (`PEERS`); takes precedence
    /// over the pattern resolver when present.
    #[serde(default)]
    pub peers: Option<String>,
    /// Number of nodes in a range-bounded pattern deployment (`NODE_COUNT`).
    #[serde(default)]
    pub node_count: Option<u64>,
    /// First numeric node index of the bounded range (`MIN_ID`).
    #[serde(default)]
    pub min_id: u64,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            port: default_udp_port(),
            host_template: None,
            peers: None,
            node_count: None,
            min_id: 0,
        }
    }
}

/// Complete middleware configuration, usually assembled from the
/// environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Transport selection (`MW_MODE`).
    #[serde(default)]
    pub mode: MiddlewareMode,
    /// Queue sizing and overflow policy.
    #[serde(default)]
    pub queues: QueueConfig,
    /// Virtual-transport fault injection.
    #[serde(default)]
    pub faults: FaultConfig,
    /// UDP endpoint identity and addressing.
    #[serde(default)]
    pub udp: UdpConfig,
}

impl MiddlewareConfig {
    /// Read every recognized key from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Assemble a configuration from an arbitrary key lookup.
    ///
    /// Extracted from [`from_env`](Self::from_env) so tests can supply maps
    /// instead of mutating process-global state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = parsed(&lookup, "MW_MODE")? {
            config.mode = mode;
        }

        if let Some(capacity) = parsed(&lookup, "QUEUE_OUT_CAPACITY")? {
            config.queues.out_capacity = require_nonzero("QUEUE_OUT_CAPACITY", capacity)?;
        }
        if let Some(capacity) = parsed(&lookup, "QUEUE_IN_CAPACITY")? {
            config.queues.in_capacity = require_nonzero("QUEUE_IN_CAPACITY", capacity)?;
        }
        if let Some(policy) = parsed(&lookup, "QUEUE_OVERFLOW_POLICY")? {
            config.queues.overflow_policy = policy;
        }
        if let Some(timeout) = parsed(&lookup, "QUEUE_BLOCK_TIMEOUT_MS")? {
            config.queues.block_timeout_ms = timeout;
        }

        if let Some(prob) = parsed(&lookup, "VIRTUAL_DROP_PROB")? {
            config.faults.drop_probability = require_probability("VIRTUAL_DROP_PROB", prob)?;
        }
        if let Some(prob) = parsed(&lookup, "VIRTUAL_DUP_PROB")? {
            config.faults.duplicate_probability = require_probability("VIRTUAL_DUP_PROB", prob)?;
        }
        if let Some(delay) = parsed(&lookup, "VIRTUAL_DELAY_MS")? {
            config.faults.delay_min_ms = delay;
            config.faults.delay_max_ms = delay;
        }
        if let Some(delay) = parsed(&lookup, "VIRTUAL_DELAY_MIN_MS")? {
            config.faults.delay_min_ms = delay;
        }
        if let Some(delay) = parsed(&lookup, "VIRTUAL_DELAY_MAX_MS")? {
            config.faults.delay_max_ms = delay;
        }
        if config.faults.delay_max_ms < config.faults.delay_min_ms {
            return Err(ConfigError::OutOfRange {
                key: "VIRTUAL_DELAY_MAX_MS",
                detail: format!(
                    "max delay {} is below min delay {}",
                    config.faults.delay_max_ms, config.faults.delay_min_ms
                ),
            });
        }
        if let Some(window) = parsed(&lookup, "VIRTUAL_REORDER_WINDOW")? {
            config.faults.reorder_window = window;
        }
        if let Some(seed) = parsed(&lookup, "VIRTUAL_SEED")? {
            config.faults.seed = seed;
        }

        config.udp.node_id = lookup("NODE_ID").filter(|value| !value.trim().is_empty());
        if let Some(port) = parsed(&lookup, "UDP_PORT")? {
            config.udp.port = port;
        }
        config.udp.host_template = lookup("HOST_TEMPLATE").filter(|value| !value.trim().is_empty());
        config.udp.peers = lookup("PEERS").filter(|value| !value.trim().is_empty());
        if let Some(count) = parsed(&lookup, "NODE_COUNT")? {
            config.udp.node_count = Some(count);
        }
        if let Some(min_id) = parsed(&lookup, "MIN_ID")? {
            config.udp.min_id = min_id;
        }

        Ok(config)
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue { key, value: raw })
        }
        _ => Ok(None),
    }
}

fn require_probability(key: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key,
            detail: format!("{value} is not within [0,1]"),
        });
    }
    Ok(value)
}

fn require_nonzero(key: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            key,
            detail: "capacity must be at least 1".to_owned(),
        });
    }
    Ok(value)
}
