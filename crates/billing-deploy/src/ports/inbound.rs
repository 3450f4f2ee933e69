//! # Inbound Ports
//!
//! API traits defining what the deployer can do.

use async_trait::async_trait;
use billing_types::FunctionSpec;

use crate::algorithms::{CodeBundle, PlanStep, Stage};
use crate::domain::{
    DeployError, DeployResult, DescriptorError, ReconciliationReport, TopologyDescriptor,
};

/// Topology reconciliation API - inbound port.
///
/// Per-resource failures are recorded in the report and never abort the
/// run; only an invalid descriptor does.
#[async_trait]
pub trait TopologyReconcilerApi: Send + Sync {
    /// Converge the whole topology, routing stage then bindings stage.
    async fn reconcile(
        &self,
        desired: &TopologyDescriptor,
    ) -> Result<ReconciliationReport, DescriptorError>;

    /// Converge the resources of one stage only.
    async fn reconcile_stage(
        &self,
        desired: &TopologyDescriptor,
        stage: Stage,
    ) -> Result<ReconciliationReport, DescriptorError>;

    /// Ordered steps a reconciliation would visit. Makes no remote call.
    fn plan(&self, desired: &TopologyDescriptor) -> Result<Vec<PlanStep>, DescriptorError>;
}

/// Function lifecycle API - inbound port.
#[async_trait]
pub trait FunctionDeployerApi: Send + Sync {
    /// Create the function or update its code and configuration.
    async fn deploy(
        &self,
        spec: &FunctionSpec,
        bundle: &CodeBundle,
    ) -> Result<DeployResult, DeployError>;
}
