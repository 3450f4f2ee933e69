//! # Outbound Ports
//!
//! The remote control plane and the local code source.
//!
//! Topology resources share one generic client shape keyed by the resource
//! type; functions have their own client since their lifecycle has more
//! steps than create/update.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use billing_types::{
    ControlPlaneError, EventBusSpec, FunctionSpec, PermissionSpec, ResourceKind, ResourceName,
    RuleSpec, TargetSpec,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::algorithms::CodeBundle;
use crate::domain::{BundleError, ProcessingFunction};

// =============================================================================
// TOPOLOGY RESOURCES
// =============================================================================

/// Whether an existing resource can be converged in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Drifted fields are updated.
    Mutable,
    /// Existence is all that is reconciled.
    Immutable,
}

/// A topology resource the reconciler can converge.
pub trait Resource:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind reported for this resource.
    const KIND: ResourceKind;

    /// Whether drift is repaired by an update.
    const MUTABILITY: Mutability;

    /// Natural key.
    fn resource_name(&self) -> ResourceName;
}

impl Resource for EventBusSpec {
    const KIND: ResourceKind = ResourceKind::EventBus;
    const MUTABILITY: Mutability = Mutability::Immutable;

    fn resource_name(&self) -> ResourceName {
        EventBusSpec::resource_name(self)
    }
}

impl Resource for RuleSpec {
    const KIND: ResourceKind = ResourceKind::Rule;
    const MUTABILITY: Mutability = Mutability::Mutable;

    fn resource_name(&self) -> ResourceName {
        RuleSpec::resource_name(self)
    }
}

impl Resource for TargetSpec {
    const KIND: ResourceKind = ResourceKind::Target;
    const MUTABILITY: Mutability = Mutability::Immutable;

    fn resource_name(&self) -> ResourceName {
        TargetSpec::resource_name(self)
    }
}

impl Resource for PermissionSpec {
    const KIND: ResourceKind = ResourceKind::Permission;
    const MUTABILITY: Mutability = Mutability::Immutable;

    fn resource_name(&self) -> ResourceName {
        PermissionSpec::resource_name(self)
    }
}

/// Control-plane client for one topology resource type - outbound port.
///
/// `describe` returns `Ok(None)` for an absent resource. Implementations
/// may instead return `ControlPlaneError::NotFound`; callers treat both
/// the same way.
#[async_trait]
pub trait ResourceClient<R: Resource>: Send + Sync {
    /// Current remote state of the resource.
    async fn describe(&self, name: &ResourceName) -> Result<Option<R>, ControlPlaneError>;

    /// Create the resource.
    async fn create(&self, spec: &R) -> Result<(), ControlPlaneError>;

    /// Converge an existing resource to `spec`.
    async fn update(&self, name: &ResourceName, spec: &R) -> Result<(), ControlPlaneError>;

    /// Delete the resource.
    async fn delete(&self, name: &ResourceName) -> Result<(), ControlPlaneError>;
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// Remote state of a deployed function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionState {
    /// Active configuration.
    pub spec: FunctionSpec,
    /// Execution role ARN.
    pub role_arn: String,
    /// Hex SHA-256 of the active code.
    pub code_sha256: String,
    /// Size of the active code in bytes.
    pub code_size: usize,
    /// Incremented on every code or configuration change.
    pub revision: u64,
}

/// Partial configuration change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionConfigUpdate {
    /// New timeout in seconds.
    pub timeout_secs: Option<u32>,
    /// New memory in MB.
    pub memory_mb: Option<u32>,
    /// New environment, replacing the old one entirely.
    pub environment: Option<BTreeMap<String, String>>,
}

impl FunctionConfigUpdate {
    /// Timeout and memory of `spec`.
    pub fn sizing_of(spec: &FunctionSpec) -> Self {
        Self {
            timeout_secs: Some(spec.timeout_secs),
            memory_mb: Some(spec.memory_mb),
            environment: None,
        }
    }

    /// Environment of `spec`.
    pub fn environment_of(spec: &FunctionSpec) -> Self {
        Self {
            environment: Some(spec.environment.clone()),
            ..Self::default()
        }
    }

    /// Apply onto a spec in place.
    pub fn apply_to(&self, spec: &mut FunctionSpec) {
        if let Some(timeout) = self.timeout_secs {
            spec.timeout_secs = timeout;
        }
        if let Some(memory) = self.memory_mb {
            spec.memory_mb = memory;
        }
        if let Some(env) = &self.environment {
            spec.environment = env.clone();
        }
    }
}

/// Control-plane client for functions - outbound port.
#[async_trait]
pub trait FunctionClient: Send + Sync {
    /// Current remote state, `None` if absent.
    async fn describe_function(&self, name: &str)
        -> Result<Option<FunctionState>, ControlPlaneError>;

    /// Create a function with its full configuration and code.
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError>;

    /// Replace the code. Either the new code becomes active or the old stays.
    async fn update_function_code(
        &self,
        name: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError>;

    /// Apply a partial configuration change.
    async fn update_function_configuration(
        &self,
        name: &str,
        update: &FunctionConfigUpdate,
    ) -> Result<(), ControlPlaneError>;

    /// Delete the function and its grants.
    async fn delete_function(&self, name: &str) -> Result<(), ControlPlaneError>;
}

/// Everything the deployer needs from the remote control plane.
pub trait ControlPlane:
    ResourceClient<EventBusSpec>
    + ResourceClient<RuleSpec>
    + ResourceClient<TargetSpec>
    + ResourceClient<PermissionSpec>
    + FunctionClient
{
}

impl<T> ControlPlane for T where
    T: ResourceClient<EventBusSpec>
        + ResourceClient<RuleSpec>
        + ResourceClient<TargetSpec>
        + ResourceClient<PermissionSpec>
        + FunctionClient
{
}

// =============================================================================
// CODE SOURCE
// =============================================================================

/// Where function code comes from - outbound port.
pub trait BundleSource: Send + Sync {
    /// Assemble the deployment bundle of one function.
    fn bundle_for(&self, function: ProcessingFunction) -> Result<CodeBundle, BundleError>;
}
