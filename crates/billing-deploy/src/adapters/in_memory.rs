//! # In-Memory Control Plane
//!
//! In-process control plane with call counters and fault injection. Used as
//! the test double for the reconciler and the function lifecycle manager,
//! and as the source of routing tables for the event router.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use billing_bus::RoutingTable;
use billing_types::{AccountContext, ControlPlaneError, FunctionSpec, ResourceKind, ResourceName};
use parking_lot::{Mutex, RwLock};

use super::state::{PlaneSnapshot, StoredResource};
use crate::algorithms::CodeBundle;
use crate::ports::{FunctionClient, FunctionConfigUpdate, FunctionState, ResourceClient};

/// Control-plane operation, for counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Describe.
    Describe,
    /// Create.
    Create,
    /// Update of a topology resource.
    Update,
    /// Delete.
    Delete,
    /// Function code update.
    UpdateCode,
    /// Function configuration update.
    UpdateConfiguration,
}

impl Operation {
    /// Whether the operation changes remote state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Describe)
    }
}

/// In-process control plane.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: RwLock<PlaneSnapshot>,
    calls: Mutex<HashMap<(ResourceKind, Operation), usize>>,
    /// Queued one-shot failures per operation.
    faults: Mutex<HashMap<(ResourceKind, Operation), VecDeque<ControlPlaneError>>>,
    /// Persistent failures for one resource name.
    name_faults: Mutex<HashMap<(ResourceKind, Operation, String), ControlPlaneError>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryControlPlane {
    /// Create an empty control plane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a control plane holding `snapshot`.
    pub fn from_snapshot(snapshot: PlaneSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    /// Calls made so far of one operation on one kind.
    pub fn calls(&self, kind: ResourceKind, op: Operation) -> usize {
        self.calls.lock().get(&(kind, op)).copied().unwrap_or(0)
    }

    /// Calls that changed (or tried to change) remote state.
    pub fn mutating_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|((_, op), _)| op.is_mutating())
            .map(|(_, n)| n)
            .sum()
    }

    /// Forget all counted calls.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail the next `times` calls of `op` on `kind` with `error`.
    pub fn fail_next(&self, kind: ResourceKind, op: Operation, times: usize, error: ControlPlaneError) {
        self.faults
            .lock()
            .entry((kind, op))
            .or_default()
            .extend(std::iter::repeat(error).take(times));
    }

    /// Fail every call of `op` on the named resource until cleared.
    pub fn fail_always(&self, kind: ResourceKind, op: Operation, name: &str, error: ControlPlaneError) {
        self.name_faults
            .lock()
            .insert((kind, op, name.to_string()), error);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
        self.name_faults.lock().clear();
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> PlaneSnapshot {
        self.state.read().clone()
    }

    /// Store a resource directly, bypassing counters and checks.
    pub fn put<R: StoredResource>(&self, spec: R) {
        R::table_mut(&mut self.state.write()).insert(spec.resource_name(), spec);
    }

    /// Remote state of one function.
    pub fn function(&self, name: &str) -> Option<FunctionState> {
        self.state.read().functions.get(name).cloned()
    }

    /// Routing table of `bus_name` with the grants actually present.
    pub fn routing_table(&self, bus_name: &str, account: &AccountContext) -> RoutingTable {
        self.state.read().routing_table(bus_name, account)
    }

    /// Count the call, then apply latency and injected faults.
    async fn enter(&self, kind: ResourceKind, op: Operation, name: &str) -> Result<(), ControlPlaneError> {
        *self.calls.lock().entry((kind, op)).or_default() += 1;

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let queued = self
            .faults
            .lock()
            .get_mut(&(kind, op))
            .and_then(|queue| queue.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }
        let pinned = self
            .name_faults
            .lock()
            .get(&(kind, op, name.to_string()))
            .cloned();
        match pinned {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: StoredResource> ResourceClient<R> for InMemoryControlPlane {
    async fn describe(&self, name: &ResourceName) -> Result<Option<R>, ControlPlaneError> {
        self.enter(R::KIND, Operation::Describe, name.as_str()).await?;
        Ok(self.state.read().get(name))
    }

    async fn create(&self, spec: &R) -> Result<(), ControlPlaneError> {
        let name = spec.resource_name();
        self.enter(R::KIND, Operation::Create, name.as_str()).await?;
        self.state.write().create(spec)
    }

    async fn update(&self, name: &ResourceName, spec: &R) -> Result<(), ControlPlaneError> {
        self.enter(R::KIND, Operation::Update, name.as_str()).await?;
        self.state.write().update(name, spec)
    }

    async fn delete(&self, name: &ResourceName) -> Result<(), ControlPlaneError> {
        self.enter(R::KIND, Operation::Delete, name.as_str()).await?;
        self.state.write().delete::<R>(name)
    }
}

#[async_trait]
impl FunctionClient for InMemoryControlPlane {
    async fn describe_function(
        &self,
        name: &str,
    ) -> Result<Option<FunctionState>, ControlPlaneError> {
        self.enter(ResourceKind::Function, Operation::Describe, name).await?;
        Ok(self.function(name))
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        self.enter(ResourceKind::Function, Operation::Create, &spec.name).await?;
        self.state.write().create_function(spec, role_arn, bundle)
    }

    async fn update_function_code(
        &self,
        name: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        self.enter(ResourceKind::Function, Operation::UpdateCode, name).await?;
        self.state.write().update_function_code(name, bundle)
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &FunctionConfigUpdate,
    ) -> Result<(), ControlPlaneError> {
        self.enter(ResourceKind::Function, Operation::UpdateConfiguration, name)
            .await?;
        self.state.write().update_function_configuration(name, update)
    }

    async fn delete_function(&self, name: &str) -> Result<(), ControlPlaneError> {
        self.enter(ResourceKind::Function, Operation::Delete, name).await?;
        self.state.write().delete_function(name)
    }
}
