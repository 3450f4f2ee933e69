//! # Billing Telemetry
//!
//! Logging and metrics for the billing pipeline deployer.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, compact for
//!   terminals or JSON for log shippers
//! - **Metrics**: Prometheus counters for reconciliation outcomes, function
//!   deploys and router deliveries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let telemetry = init_telemetry(&TelemetryConfig::from_env())?;
//!     // ... run the deployment ...
//!     println!("{}", telemetry.metrics.render()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BILLING_LOG_LEVEL` | `info` | Log filter, falls back to `RUST_LOG` |
//! | `BILLING_JSON_LOGS` | `false` | JSON log lines |
//! | `BILLING_LOG_SOURCE` | `false` | File and line on every event |
//! | `BILLING_SERVICE_NAME` | `billing-deploy` | Service name |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{
    encode_metrics, record_dispatch, record_function_deploy, record_resource, register_metrics,
    MetricsHandle, DELIVERIES, DEPLOY_DURATION, EVENTS_ROUTED, FUNCTION_DEPLOYS,
    RESOURCES_RECONCILED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logger: {0}")]
    LoggerInit(String),

    /// A collector could not be created or registered.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Handle returned by `init_telemetry`.
pub struct TelemetryGuard {
    /// Registered metrics.
    pub metrics: MetricsHandle,
}

/// Install logging and register metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(config)?;
    let metrics = register_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { metrics })
}
