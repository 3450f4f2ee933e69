//! # Simulated Control-Plane State
//!
//! The resource store shared by the in-memory and file-backed control
//! planes, enforcing the same preconditions the managed platform does:
//!
//! - a rule needs its bus, a target needs its rule
//! - a grant needs its function
//! - a bus with rules, or a rule with targets, cannot be deleted
//! - creating something that exists fails with "already exists"

use std::collections::BTreeMap;

use billing_bus::RoutingTable;
use billing_types::{
    AccountContext, ControlPlaneError, EventBusSpec, FunctionSpec, PermissionSpec, ResourceKind,
    ResourceName, RuleSpec, TargetSpec,
};
use serde::{Deserialize, Serialize};

use crate::algorithms::CodeBundle;
use crate::domain::{validate_sizing, FunctionSizing};
use crate::ports::{FunctionConfigUpdate, FunctionState, Resource};

/// Largest total size of a function environment, in bytes.
pub const MAX_ENVIRONMENT_BYTES: usize = 4 * 1024;

/// Full content of a simulated control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneSnapshot {
    /// Buses by name.
    #[serde(default)]
    pub buses: BTreeMap<ResourceName, EventBusSpec>,
    /// Rules by `bus/rule`.
    #[serde(default)]
    pub rules: BTreeMap<ResourceName, RuleSpec>,
    /// Targets by `bus/rule/id`.
    #[serde(default)]
    pub targets: BTreeMap<ResourceName, TargetSpec>,
    /// Grants by `function/statement`.
    #[serde(default)]
    pub permissions: BTreeMap<ResourceName, PermissionSpec>,
    /// Functions by name.
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionState>,
}

/// A topology resource the simulated planes can store.
pub trait StoredResource: Resource {
    /// The table holding this kind.
    fn table(state: &PlaneSnapshot) -> &BTreeMap<ResourceName, Self>;

    /// The table holding this kind, mutably.
    fn table_mut(state: &mut PlaneSnapshot) -> &mut BTreeMap<ResourceName, Self>;

    /// Preconditions of create and update.
    fn check_parent(&self, _state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        Ok(())
    }

    /// Preconditions of delete.
    fn check_children(_name: &ResourceName, _state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        Ok(())
    }

    /// Error for a create that collides with an existing resource.
    fn collision(&self) -> ControlPlaneError {
        ControlPlaneError::already_exists(Self::KIND, &self.resource_name())
    }
}

impl StoredResource for EventBusSpec {
    fn table(state: &PlaneSnapshot) -> &BTreeMap<ResourceName, Self> {
        &state.buses
    }

    fn table_mut(state: &mut PlaneSnapshot) -> &mut BTreeMap<ResourceName, Self> {
        &mut state.buses
    }

    fn check_children(name: &ResourceName, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        if state.rules.values().any(|r| r.bus_name == name.as_str()) {
            return Err(ControlPlaneError::ConfigInvalid(format!(
                "event bus {name} still has rules"
            )));
        }
        Ok(())
    }
}

impl StoredResource for RuleSpec {
    fn table(state: &PlaneSnapshot) -> &BTreeMap<ResourceName, Self> {
        &state.rules
    }

    fn table_mut(state: &mut PlaneSnapshot) -> &mut BTreeMap<ResourceName, Self> {
        &mut state.rules
    }

    fn check_parent(&self, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        let bus = ResourceName(self.bus_name.clone());
        if !state.buses.contains_key(&bus) {
            return Err(ControlPlaneError::not_found(ResourceKind::EventBus, &bus));
        }
        if self.pattern.is_empty() {
            return Err(ControlPlaneError::ConfigInvalid(format!(
                "rule {} has an empty event pattern",
                self.name
            )));
        }
        Ok(())
    }

    fn check_children(name: &ResourceName, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        if state.targets.values().any(|t| &t.rule_resource_name() == name) {
            return Err(ControlPlaneError::ConfigInvalid(format!(
                "rule {name} still has targets"
            )));
        }
        Ok(())
    }
}

impl StoredResource for TargetSpec {
    fn table(state: &PlaneSnapshot) -> &BTreeMap<ResourceName, Self> {
        &state.targets
    }

    fn table_mut(state: &mut PlaneSnapshot) -> &mut BTreeMap<ResourceName, Self> {
        &mut state.targets
    }

    fn check_parent(&self, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        let rule = self.rule_resource_name();
        if !state.rules.contains_key(&rule) {
            return Err(ControlPlaneError::not_found(ResourceKind::Rule, &rule));
        }
        Ok(())
    }
}

impl StoredResource for PermissionSpec {
    fn table(state: &PlaneSnapshot) -> &BTreeMap<ResourceName, Self> {
        &state.permissions
    }

    fn table_mut(state: &mut PlaneSnapshot) -> &mut BTreeMap<ResourceName, Self> {
        &mut state.permissions
    }

    fn check_parent(&self, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        if !state.functions.contains_key(&self.function_name) {
            return Err(ControlPlaneError::not_found(
                ResourceKind::Function,
                &ResourceName(self.function_name.clone()),
            ));
        }
        Ok(())
    }

    fn collision(&self) -> ControlPlaneError {
        ControlPlaneError::DuplicateStatement {
            function_name: self.function_name.clone(),
            statement_id: self.statement_id.clone(),
        }
    }
}

impl PlaneSnapshot {
    /// Stored copy of a resource.
    pub fn get<R: StoredResource>(&self, name: &ResourceName) -> Option<R> {
        R::table(self).get(name).cloned()
    }

    /// Create a resource.
    pub fn create<R: StoredResource>(&mut self, spec: &R) -> Result<(), ControlPlaneError> {
        let name = spec.resource_name();
        if R::table(self).contains_key(&name) {
            return Err(spec.collision());
        }
        spec.check_parent(self)?;
        R::table_mut(self).insert(name, spec.clone());
        Ok(())
    }

    /// Replace an existing resource.
    pub fn update<R: StoredResource>(
        &mut self,
        name: &ResourceName,
        spec: &R,
    ) -> Result<(), ControlPlaneError> {
        if !R::table(self).contains_key(name) {
            return Err(ControlPlaneError::not_found(R::KIND, name));
        }
        if &spec.resource_name() != name {
            return Err(ControlPlaneError::ConfigInvalid(format!(
                "cannot rename {} {} to {}",
                R::KIND,
                name,
                spec.resource_name()
            )));
        }
        spec.check_parent(self)?;
        R::table_mut(self).insert(name.clone(), spec.clone());
        Ok(())
    }

    /// Delete a resource.
    pub fn delete<R: StoredResource>(&mut self, name: &ResourceName) -> Result<(), ControlPlaneError> {
        if !R::table(self).contains_key(name) {
            return Err(ControlPlaneError::not_found(R::KIND, name));
        }
        R::check_children(name, self)?;
        R::table_mut(self).remove(name);
        Ok(())
    }

    /// Create a function.
    pub fn create_function(
        &mut self,
        spec: &FunctionSpec,
        role_arn: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        if self.functions.contains_key(&spec.name) {
            return Err(ControlPlaneError::already_exists(
                ResourceKind::Function,
                &spec.resource_name(),
            ));
        }
        check_sizing(&spec.name, spec.timeout_secs, spec.memory_mb)?;
        check_environment(spec)?;
        if role_arn.is_empty() {
            return Err(ControlPlaneError::ConfigInvalid(format!(
                "function {} needs an execution role",
                spec.name
            )));
        }
        self.functions.insert(
            spec.name.clone(),
            FunctionState {
                spec: spec.clone(),
                role_arn: role_arn.to_string(),
                code_sha256: bundle.sha256().to_string(),
                code_size: bundle.size(),
                revision: 1,
            },
        );
        Ok(())
    }

    /// Replace the code of a function.
    pub fn update_function_code(
        &mut self,
        name: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        let state = self.function_mut(name)?;
        state.code_sha256 = bundle.sha256().to_string();
        state.code_size = bundle.size();
        state.revision += 1;
        Ok(())
    }

    /// Apply a configuration change to a function.
    pub fn update_function_configuration(
        &mut self,
        name: &str,
        update: &FunctionConfigUpdate,
    ) -> Result<(), ControlPlaneError> {
        let state = self.function_mut(name)?;
        let mut next = state.spec.clone();
        update.apply_to(&mut next);
        check_sizing(name, next.timeout_secs, next.memory_mb)?;
        check_environment(&next)?;
        state.spec = next;
        state.revision += 1;
        Ok(())
    }

    /// Delete a function and every grant on it.
    pub fn delete_function(&mut self, name: &str) -> Result<(), ControlPlaneError> {
        if self.functions.remove(name).is_none() {
            return Err(ControlPlaneError::not_found(
                ResourceKind::Function,
                &ResourceName(name.to_string()),
            ));
        }
        self.permissions.retain(|_, p| p.function_name != name);
        Ok(())
    }

    /// Routing table of `bus_name` with the grants actually present.
    pub fn routing_table(&self, bus_name: &str, account: &AccountContext) -> RoutingTable {
        let rules: Vec<_> = self.rules.values().cloned().collect();
        let targets: Vec<_> = self.targets.values().cloned().collect();
        let permissions: Vec<_> = self.permissions.values().cloned().collect();
        RoutingTable::from_parts(bus_name, account, &rules, &targets, &permissions)
    }

    fn function_mut(&mut self, name: &str) -> Result<&mut FunctionState, ControlPlaneError> {
        self.functions.get_mut(name).ok_or_else(|| {
            ControlPlaneError::not_found(ResourceKind::Function, &ResourceName(name.to_string()))
        })
    }
}

fn check_sizing(name: &str, timeout_secs: u32, memory_mb: u32) -> Result<(), ControlPlaneError> {
    validate_sizing(
        name,
        FunctionSizing {
            timeout_secs,
            memory_mb,
        },
    )
    .map_err(|e| ControlPlaneError::ConfigInvalid(e.to_string()))
}

fn check_environment(spec: &FunctionSpec) -> Result<(), ControlPlaneError> {
    let size: usize = spec
        .environment
        .iter()
        .map(|(key, value)| key.len() + value.len())
        .sum();
    if size > MAX_ENVIRONMENT_BYTES {
        return Err(ControlPlaneError::ConfigInvalid(format!(
            "environment of {} is {size} bytes, limit is {MAX_ENVIRONMENT_BYTES}",
            spec.name
        )));
    }
    Ok(())
}
