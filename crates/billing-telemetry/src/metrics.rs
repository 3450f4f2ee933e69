//! Prometheus metrics for the billing deployer.
//!
//! All metrics follow the naming convention: `billing_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: resources reconciled, function deploys, envelopes routed
//! - **Histogram**: wall time of a deployment run

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // RECONCILER METRICS
    // =========================================================================

    /// Reconciled resources by kind and outcome
    pub static ref RESOURCES_RECONCILED: CounterVec = CounterVec::new(
        Opts::new(
            "billing_reconciler_resources_total",
            "Resources reconciled, by kind and outcome"
        ),
        &["kind", "outcome"]
    ).expect("metric creation failed");

    /// Deployment run duration by scope
    pub static ref DEPLOY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "billing_deploy_duration_seconds",
            "Wall time of a deployment run"
        ).buckets(exponential_buckets(0.01, 2.0, 14).expect("bucket layout")),
        &["scope"]
    ).expect("metric creation failed");

    // =========================================================================
    // FUNCTION LIFECYCLE METRICS
    // =========================================================================

    /// Function deploys by function and action
    pub static ref FUNCTION_DEPLOYS: CounterVec = CounterVec::new(
        Opts::new(
            "billing_lifecycle_deploys_total",
            "Function deploys, by function and action"
        ),
        &["function", "action"]
    ).expect("metric creation failed");

    // =========================================================================
    // ROUTER METRICS
    // =========================================================================

    /// Envelopes dispatched by the router
    pub static ref EVENTS_ROUTED: IntCounter = IntCounter::new(
        "billing_router_events_routed_total",
        "Envelopes dispatched by the router"
    ).expect("metric creation failed");

    /// Deliveries by outcome
    pub static ref DELIVERIES: CounterVec = CounterVec::new(
        Opts::new(
            "billing_router_deliveries_total",
            "Deliveries to targets, by outcome"
        ),
        &["outcome"]
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        encode(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once: collectors already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Reconciler
        Box::new(RESOURCES_RECONCILED.clone()),
        Box::new(DEPLOY_DURATION.clone()),
        // Lifecycle
        Box::new(FUNCTION_DEPLOYS.clone()),
        // Router
        Box::new(EVENTS_ROUTED.clone()),
        Box::new(DELIVERIES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode the global registry for scraping or a final dump.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode(&REGISTRY)
}

fn encode(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count one reconciled resource.
pub fn record_resource(kind: &str, outcome: &str) {
    RESOURCES_RECONCILED.with_label_values(&[kind, outcome]).inc();
}

/// Count one function deploy. `action` is `created`, `updated` or `failed`.
pub fn record_function_deploy(function: &str, action: &str) {
    FUNCTION_DEPLOYS.with_label_values(&[function, action]).inc();
}

/// Count one routed envelope and its deliveries by outcome.
pub fn record_dispatch(delivered: usize, denied: usize, failed: usize) {
    EVENTS_ROUTED.inc();
    for (outcome, count) in [
        ("delivered", delivered),
        ("permission_denied", denied),
        ("failed", failed),
    ] {
        if count > 0 {
            DELIVERIES.with_label_values(&[outcome]).inc_by(count as f64);
        }
    }
}
