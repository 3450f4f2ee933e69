//! # Deployment Pipeline
//!
//! One deployment run, in dependency order:
//!
//! ```text
//! routing stage (bus → rules) → functions → bindings stage (targets → grants)
//! ```
//!
//! Grants reference functions, so functions are deployed before the
//! bindings stage. A single-function run deploys that function only.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use super::function_lifecycle::FunctionLifecycleManager;
use super::reconciler::{ReconcileOptions, Reconciler};
use crate::algorithms::{build_plan, Stage};
use crate::domain::{
    DeployConfig, DeployResult, DeployTarget, DescriptorError, ProcessingFunction,
    ReconciliationReport, TopologyDescriptor,
};
use crate::ports::{BundleSource, ControlPlane, FunctionDeployerApi, TopologyReconcilerApi};

/// Outcome of deploying one function within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionReport {
    /// The function.
    pub function: ProcessingFunction,
    /// Deploy result, or the reason it failed.
    pub result: Result<DeployResult, String>,
}

impl fmt::Display for FunctionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(result) => fmt::Display::fmt(result, f),
            Err(reason) => write!(
                f,
                "✗ function   {:<10} {} ({reason})",
                "failed",
                self.function.name()
            ),
        }
    }
}

/// Everything a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Topology entries of both stages, empty for single-function runs.
    pub topology: ReconciliationReport,
    /// One entry per deployed function.
    pub functions: Vec<FunctionReport>,
}

impl PipelineReport {
    /// Whether every resource and every function succeeded.
    pub fn is_success(&self) -> bool {
        self.topology.is_success() && self.functions.iter().all(|f| f.result.is_ok())
    }

    /// Number of failed resources and functions.
    pub fn failure_count(&self) -> usize {
        self.topology.failures().count()
            + self.functions.iter().filter(|f| f.result.is_err()).count()
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.topology.entries.is_empty() {
            writeln!(f, "{}", self.topology)?;
        }
        for function in &self.functions {
            writeln!(f, "{function}")?;
        }
        if self.is_success() {
            write!(f, "deployment succeeded")
        } else {
            write!(f, "deployment finished with {} failure(s)", self.failure_count())
        }
    }
}

/// Orchestrates a deployment run.
pub struct DeploymentPipeline<C: ControlPlane, B: BundleSource> {
    config: DeployConfig,
    descriptor: TopologyDescriptor,
    reconciler: Reconciler<C>,
    lifecycle: FunctionLifecycleManager<C>,
    bundles: B,
}

impl<C: ControlPlane + 'static, B: BundleSource> DeploymentPipeline<C, B> {
    /// Pipeline deploying the production topology.
    pub fn new(config: DeployConfig, client: Arc<C>, bundles: B) -> Self {
        let descriptor = TopologyDescriptor::billing_default(&config);
        Self::with_descriptor(config, descriptor, client, bundles, ReconcileOptions::default())
    }

    /// Pipeline deploying an explicit topology.
    pub fn with_descriptor(
        config: DeployConfig,
        descriptor: TopologyDescriptor,
        client: Arc<C>,
        bundles: B,
        options: ReconcileOptions,
    ) -> Self {
        let role_arn = config.role_arn();
        Self {
            reconciler: Reconciler::with_options(client.clone(), options),
            lifecycle: FunctionLifecycleManager::new(client, role_arn),
            config,
            descriptor,
            bundles,
        }
    }

    /// The topology this pipeline converges.
    pub fn descriptor(&self) -> &TopologyDescriptor {
        &self.descriptor
    }

    /// Ordered actions a run would take. Makes no remote call.
    pub fn dry_run(&self, target: DeployTarget) -> Result<Vec<String>, DescriptorError> {
        let mut lines = Vec::new();
        let plan = if target.includes_topology() {
            build_plan(&self.descriptor)?
        } else {
            Vec::new()
        };

        let stage_lines = |stage: Stage| {
            plan.iter()
                .filter(move |step| step.resource.stage() == stage)
                .map(|step| {
                    format!(
                        "reconcile {} {}",
                        step.resource.kind(),
                        step.resource.name()
                    )
                })
                .collect::<Vec<_>>()
        };

        lines.extend(stage_lines(Stage::Routing));
        for function in target.functions() {
            lines.push(format!(
                "deploy function {} ({})",
                function.name(),
                function.handler()
            ));
        }
        lines.extend(stage_lines(Stage::Bindings));
        Ok(lines)
    }

    /// Execute a run. Only an invalid descriptor aborts it.
    pub async fn run(&self, target: DeployTarget) -> Result<PipelineReport, DescriptorError> {
        info!(scope = %target, bus = %self.config.bus_name, "Deployment started");
        let mut report = PipelineReport::default();

        if target.includes_topology() {
            report.topology = self
                .reconciler
                .reconcile_stage(&self.descriptor, Stage::Routing)
                .await?;
        }

        for function in target.functions() {
            report.functions.push(self.deploy_function(function).await);
        }

        if target.includes_topology() {
            let bindings = self
                .reconciler
                .reconcile_stage_after(&self.descriptor, Stage::Bindings, &report.topology)
                .await?;
            report.topology.extend(bindings);
        }

        info!(
            success = report.is_success(),
            failures = report.failure_count(),
            "Deployment finished"
        );
        Ok(report)
    }

    async fn deploy_function(&self, function: ProcessingFunction) -> FunctionReport {
        let spec = function.spec(&self.config);
        let result = match self.bundles.bundle_for(function) {
            Ok(bundle) => self
                .lifecycle
                .deploy(&spec, &bundle)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = &result {
            error!(function = function.name(), error = %reason, "Function deploy failed");
        }
        FunctionReport { function, result }
    }
}
