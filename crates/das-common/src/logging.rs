//! ---
//! das_section: "01-core-runtime"
//! das_subsection: "module"
//! das_type: "source"
//! das_scope: "code"
//! das_description: "Shared primitives and utilities for the DAS runtime."
//! das_version: "v0.1.0"
//! das_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "DAS_LOG";
const LOG_DIR_ENV: &str = "DAS_LOG_DIR";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for DAS processes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Structured JSON lines, container-friendly.
    #[default]
    StructuredJson,
    /// Human-oriented output for interactive runs.
    Pretty,
}

/// Initialize the tracing subscriber for a DAS process.
///
/// * `DAS_LOG` overrides the filter (e.g. `info`, `debug,das_net=trace`).
///   When unset the standard `RUST_LOG` variable is honoured, finally
///   defaulting to `info`.
/// * When `DAS_LOG_DIR` points at a directory, a rolling daily file is
///   written there in addition to stdout.
pub fn init_tracing(service_name: &str, format: LogFormat) -> Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to info logging",
                LOG_ENV, err
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = STDOUT_GUARD.set(stdout_guard);

    let fmt_layer = match format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = match std::env::var(LOG_DIR_ENV) {
        Ok(directory) if !directory.trim().is_empty() => {
            std::fs::create_dir_all(Path::new(&directory))?;
            let appender = daily(&directory, format!("{service_name}.log"));
            let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(file_guard);
            Some(fmt::layer().with_ansi(false).with_writer(file_writer).boxed())
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    info!(service = service_name, "tracing initialized");
    Ok(())
}
