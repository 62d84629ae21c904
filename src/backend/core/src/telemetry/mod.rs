//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: JSON/pretty output through `tracing-subscriber`, with
//!   credential redaction
//! - **Metrics**: counters and histograms through the `metrics` facade,
//!   exported in Prometheus text format
//!
//! # Example
//!
//! ```rust,no_run
//! use bastion_core::config::ObservabilityConfig;
//! use bastion_core::telemetry::init_telemetry;
//!
//! let registry = init_telemetry(&ObservabilityConfig::default(), "bastion").unwrap();
//! println!("{}", registry.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, RedactionConfig, RedactionPattern, SensitiveFieldRedactor};
pub use metrics::{init_metrics, track_requests, MetricsRegistry};

use crate::config::ObservabilityConfig;

/// Install logging, then metrics when enabled.
///
/// # Errors
///
/// Returns an error if either subsystem was already initialized or the log
/// filter is invalid.
pub fn init_telemetry(config: &ObservabilityConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    init_logging(&LoggingConfig::from(config))?;

    if config.metrics_enabled {
        init_metrics(service_name)
    } else {
        ::tracing::info!("Metrics disabled");
        Ok(MetricsRegistry::disabled())
    }
}
