//! # Billing Deploy
//!
//! Idempotent deployment of the billing event pipeline: the shared bus, its
//! rules, their function targets, the invocation grants, and the functions
//! themselves.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Re-runnable | Describe before create; "already exists" is success |
//! | Dependency order | Topological plan: bus → rule → target → grant |
//! | Bulkhead | A failed resource fails only its dependents |
//! | Bounded calls | Per-call timeout, backoff on transient errors only |
//! | Reproducible code | Sorted, hashed bundles |
//!
//! ## Module Structure
//!
//! ```text
//! billing-deploy/
//! ├── domain/      # Descriptor, config, function catalog, reports, errors
//! ├── algorithms/  # Plan ordering, bundle assembly
//! ├── ports/       # Reconciler/deployer APIs, control-plane clients
//! ├── service/     # Reconciler, function lifecycle, pipeline
//! └── adapters/    # In-memory and file-backed planes, retry decorator
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{
    FileControlPlane, InMemoryControlPlane, Operation, PlaneSnapshot, RetryingControlPlane,
};
pub use algorithms::{
    build_plan, BundleBuilder, CodeBundle, DesiredResource, DirectoryBundleSource, PlanStep,
    Stage,
};
pub use domain::{
    BundleError, ConfigError, DeployAction, DeployConfig, DeployError, DeployResult, DeployTarget,
    DescriptorError, Outcome, ProcessingFunction, ReconciliationReport, ResourceReport,
    RetryPolicy, RuleBinding, TopologyDescriptor, UnknownFunction,
};
pub use ports::{
    BundleSource, ControlPlane, FunctionClient, FunctionConfigUpdate, FunctionDeployerApi,
    FunctionState, Mutability, Resource, ResourceClient, TopologyReconcilerApi,
};
pub use service::{
    DeploymentPipeline, FunctionLifecycleManager, FunctionReport, PipelineReport,
    ReconcileOptions, Reconciler,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
