//! # Recovery Telemetry
//!
//! Logging and metrics for the key recovery binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recovery_telemetry::{init_logging, TelemetryConfig};
//!
//! init_logging(&TelemetryConfig::from_env())?;
//! let report = service.run_batch(signatures).await?;
//! recovery_telemetry::record_batch(&report);
//! std::fs::write("metrics.prom", recovery_telemetry::encode_metrics()?)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, wins over `KR_LOG_LEVEL` |
//! | `KR_LOG_LEVEL` | `info` | Log level filter |
//! | `KR_JSON_LOGS` | `false` | Emit JSON lines instead of text |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_batch, register_metrics, GCD_DURATION, GROUPS_TOTAL,
    KEYS_RECOVERED, KEY_PERIODS_EXTENDED, PAIRS_TOTAL, REGISTRY,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
