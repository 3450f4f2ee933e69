//! # Run Orchestration
//!
//! Builds the control plane stack for an `Invocation`, drives the pipeline
//! and prints status lines.
//!
//! ```text
//! DeploymentPipeline
//!        │
//!        ↓
//! RetryingControlPlane  (per-call timeout, backoff on transient errors)
//!        │
//!        ↓
//! FileControlPlane      (JSON state, exclusive file lock per call)
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use billing_deploy::{
    DeploymentPipeline, DirectoryBundleSource, FileControlPlane, PipelineReport,
    ReconcileOptions, RetryingControlPlane,
};
use billing_telemetry::{record_function_deploy, record_resource, DEPLOY_DURATION};
use tracing::{info, warn};

use crate::cli::{Invocation, Mode};
use crate::{EXIT_FAILURE, EXIT_SUCCESS};

/// Run an invocation, writing status lines to `out`.
///
/// Returns the exit code. `Err` means the run aborted before converging
/// anything, e.g. an invalid topology or an unwritable output.
pub async fn execute<W: Write>(invocation: Invocation, out: &mut W) -> Result<u8> {
    let Invocation {
        target,
        config,
        descriptor,
        mode,
        concurrent,
        ..
    } = invocation;

    let plane = Arc::new(RetryingControlPlane::new(
        Arc::new(FileControlPlane::new(&config.state_file)),
        config.retry,
        config.call_timeout,
    ));
    let bundles = DirectoryBundleSource::new(&config.source_dir, config.deps_dir.clone());
    let state_file = config.state_file.clone();
    let pipeline = DeploymentPipeline::with_descriptor(
        config,
        descriptor,
        plane,
        bundles,
        ReconcileOptions {
            concurrent_rules: concurrent,
        },
    );

    match mode {
        Mode::PrintTopology => {
            let document = pipeline
                .descriptor()
                .to_json_pretty()
                .context("rendering topology")?;
            writeln!(out, "{document}")?;
            Ok(EXIT_SUCCESS)
        }
        Mode::DryRun => {
            let steps = pipeline.dry_run(target).context("planning deployment")?;
            for (index, step) in steps.iter().enumerate() {
                writeln!(out, "{:>2}. {step}", index + 1)?;
            }
            Ok(EXIT_SUCCESS)
        }
        Mode::Deploy => {
            info!(scope = %target, state = %state_file.display(), "Deploying billing pipeline");
            let started = Instant::now();
            let report = pipeline.run(target).await.context("deployment aborted")?;
            let scope = target.to_string();
            DEPLOY_DURATION
                .with_label_values(&[scope.as_str()])
                .observe(started.elapsed().as_secs_f64());

            record_metrics(&report);
            write!(out, "{report}")?;

            if report.is_success() {
                Ok(EXIT_SUCCESS)
            } else {
                warn!(failures = report.failure_count(), "Deployment incomplete");
                Ok(EXIT_FAILURE)
            }
        }
    }
}

/// Count every entry of a report in the process metrics.
pub fn record_metrics(report: &PipelineReport) {
    for entry in &report.topology.entries {
        record_resource(&entry.kind.to_string(), entry.outcome.label());
    }
    for function in &report.functions {
        let action = match &function.result {
            Ok(result) => result.action.to_string(),
            Err(_) => "failed".to_string(),
        };
        record_function_deploy(function.function.name(), &action);
    }
}
