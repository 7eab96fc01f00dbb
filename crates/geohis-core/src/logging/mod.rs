//! Structured logging for geohis.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - JSON lines for pipelines and log shippers
//!
//! stdout is reserved for command payloads; all log output goes to stderr.
//! Engine code logs through `tracing` with `session_id` and `stage` fields.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Env filter for the resolved level, scoped to the geohis crates.
fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "geohis_core={lvl},geohis_config={lvl},geohis={lvl}",
        lvl = config.level
    ))
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call
/// is ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("geohis: logging already initialized: {}", e);
    }
}
