//! # Flowline Telemetry
//!
//! Process-level observability for applications built on Flowline. The
//! engine crates only emit `tracing` events and bump Prometheus counters;
//! this crate installs the subscriber that prints them and renders the
//! counters for scraping.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowline_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! // ...
//! let body = flowline_telemetry::encode_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FLOWLINE_SERVICE_NAME` | `flowline` | Service name in logs |
//! | `FLOWLINE_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `FLOWLINE_JSON_LOGS` | `false` | One JSON object per line |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::encode_metrics;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Failed to encode Prometheus metrics: {0}")]
    Metrics(String),
}
