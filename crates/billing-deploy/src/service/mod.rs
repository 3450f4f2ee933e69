//! # Service Layer
//!
//! Orchestrates domain logic over the outbound ports.

mod locks;
pub mod function_lifecycle;
pub mod pipeline;
pub mod reconciler;

pub use function_lifecycle::FunctionLifecycleManager;
pub use locks::NameLocks;
pub use pipeline::{DeploymentPipeline, FunctionReport, PipelineReport};
pub use reconciler::{ReconcileOptions, Reconciler};
