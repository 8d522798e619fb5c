//! ---
//! das_section: "01-core-runtime"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Shared primitives and utilities for the DAS runtime."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
//! Shared runtime primitives for the DAS workspace: the environment-driven
//! middleware configuration and the tracing bootstrap.

pub mod config;
pub mod logging;

pub use config::{
    ConfigError, FaultConfig, MiddlewareConfig, MiddlewareMode, OverflowPolicy, QueueConfig,
    UdpConfig,
};
pub use logging::{init_tracing, LogFormat};
