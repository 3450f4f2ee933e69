//! # Reconciliation Plan
//!
//! Flattens a descriptor into resource steps and orders them so that every
//! resource comes after the resources it depends on:
//!
//! ```text
//! event bus → rule → target → permission
//! ```
//!
//! Ordering is a topological sort over explicit `depends_on` edges. Ties
//! are broken by kind and then by declaration order, which keeps the plan
//! (and therefore the report) stable across runs.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use billing_types::{
    EventBusSpec, PermissionSpec, ResourceKind, ResourceName, RuleSpec, TargetSpec,
};

use crate::domain::{DescriptorError, TopologyDescriptor};

/// Deployment stage a step belongs to.
///
/// Functions are deployed between the two stages: targets and grants refer
/// to function ARNs, rules and the bus do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Event bus and rules.
    Routing,
    /// Targets and permissions.
    Bindings,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Routing => "routing",
            Self::Bindings => "bindings",
        })
    }
}

/// One desired resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredResource {
    /// The bus.
    EventBus(EventBusSpec),
    /// A rule.
    Rule(RuleSpec),
    /// A target.
    Target(TargetSpec),
    /// A grant.
    Permission(PermissionSpec),
}

impl DesiredResource {
    /// Kind of the resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::EventBus(_) => ResourceKind::EventBus,
            Self::Rule(_) => ResourceKind::Rule,
            Self::Target(_) => ResourceKind::Target,
            Self::Permission(_) => ResourceKind::Permission,
        }
    }

    /// Natural key.
    pub fn name(&self) -> ResourceName {
        match self {
            Self::EventBus(spec) => spec.resource_name(),
            Self::Rule(spec) => spec.resource_name(),
            Self::Target(spec) => spec.resource_name(),
            Self::Permission(spec) => spec.resource_name(),
        }
    }

    /// Stage the resource is reconciled in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::EventBus(_) | Self::Rule(_) => Stage::Routing,
            Self::Target(_) | Self::Permission(_) => Stage::Bindings,
        }
    }
}

/// Key of a step: kind plus name, since names are only unique per kind.
pub type StepKey = (ResourceKind, ResourceName);

/// A resource and what it waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// The resource.
    pub resource: DesiredResource,
    /// Steps that must succeed first.
    pub depends_on: Vec<StepKey>,
    /// Rule this step belongs to, `None` for the bus. Steps of different
    /// rules are independent of each other.
    pub group: Option<ResourceName>,
}

impl PlanStep {
    /// Key of this step.
    pub fn key(&self) -> StepKey {
        (self.resource.kind(), self.resource.name())
    }
}

/// Flatten and order a validated descriptor.
pub fn build_plan(descriptor: &TopologyDescriptor) -> Result<Vec<PlanStep>, DescriptorError> {
    descriptor.validate()?;

    let bus_key = (ResourceKind::EventBus, descriptor.event_bus.resource_name());
    let mut steps = vec![PlanStep {
        resource: DesiredResource::EventBus(descriptor.event_bus.clone()),
        depends_on: Vec::new(),
        group: None,
    }];

    for binding in &descriptor.rules {
        let rule_name = binding.rule.resource_name();
        let rule_key = (ResourceKind::Rule, rule_name.clone());
        steps.push(PlanStep {
            resource: DesiredResource::Rule(binding.rule.clone()),
            depends_on: vec![bus_key.clone()],
            group: Some(rule_name.clone()),
        });
        for target in &binding.targets {
            steps.push(PlanStep {
                resource: DesiredResource::Target(target.clone()),
                depends_on: vec![rule_key.clone()],
                group: Some(rule_name.clone()),
            });
        }
        for permission in &binding.permissions {
            let granted_targets = binding
                .targets
                .iter()
                .filter(|t| t.function_name == permission.function_name)
                .map(|t| (ResourceKind::Target, t.resource_name()))
                .collect();
            steps.push(PlanStep {
                resource: DesiredResource::Permission(permission.clone()),
                depends_on: granted_targets,
                group: Some(rule_name.clone()),
            });
        }
    }

    topological_order(steps)
}

/// Order steps so every dependency precedes its dependents.
///
/// Fails if a dependency names a step that is not in the plan or if the
/// edges form a cycle.
pub fn topological_order(steps: Vec<PlanStep>) -> Result<Vec<PlanStep>, DescriptorError> {
    let index: HashMap<StepKey, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| (step.key(), i))
        .collect();

    let mut indegree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let &d = index.get(dep).ok_or_else(|| {
                DescriptorError::InvalidGraph(format!(
                    "{} {} depends on missing {} {}",
                    step.resource.kind(),
                    step.resource.name(),
                    dep.0,
                    dep.1
                ))
            })?;
            indegree[i] += 1;
            dependents[d].push(i);
        }
    }

    // Ready set ordered by (kind, declaration index).
    let mut ready: BTreeSet<(ResourceKind, usize)> = steps
        .iter()
        .enumerate()
        .filter(|(i, _)| indegree[*i] == 0)
        .map(|(i, step)| (step.resource.kind(), i))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(next) = ready.pop_first() {
        let (_, i) = next;
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert((steps[dependent].resource.kind(), dependent));
            }
        }
    }

    if order.len() != steps.len() {
        return Err(DescriptorError::InvalidGraph(
            "resource dependencies form a cycle".to_string(),
        ));
    }

    let mut slots: Vec<Option<PlanStep>> = steps.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}
