//! # Topology Reconciler
//!
//! Converges the remote topology to a descriptor. For every resource, in
//! plan order:
//!
//! 1. Describe it. Absent (or `NotFound`) means create.
//! 2. Absent: create it. "Already exists" means a concurrent writer got
//!    there first; the resource is reported unchanged.
//! 3. Present and mutable (rules): update it if any field drifted.
//! 4. Present and immutable (bus, targets, grants): nothing to do. Drift is
//!    logged, never repaired.
//!
//! A failing resource is recorded and its dependents are skipped as failed.
//! Resources that do not depend on it are still reconciled.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use billing_types::{ErrorClass, ResourceKind, ResourceName};
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::locks::NameLocks;
use crate::algorithms::{build_plan, DesiredResource, PlanStep, Stage, StepKey};
use crate::domain::{
    DescriptorError, Outcome, ReconciliationReport, ResourceReport, TopologyDescriptor,
};
use crate::ports::{ControlPlane, Mutability, Resource, ResourceClient, TopologyReconcilerApi};

/// Tuning of a reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Reconcile independent rule trees concurrently.
    pub concurrent_rules: bool,
}

/// Steps of a run, tagged with their plan position.
type IndexedSteps = Vec<(usize, PlanStep)>;

/// Topology reconciler over a control plane.
pub struct Reconciler<C: ControlPlane> {
    client: Arc<C>,
    locks: NameLocks,
    options: ReconcileOptions,
}

impl<C: ControlPlane> Reconciler<C> {
    /// Create a reconciler with default options.
    pub fn new(client: Arc<C>) -> Self {
        Self::with_options(client, ReconcileOptions::default())
    }

    /// Create a reconciler with explicit options.
    pub fn with_options(client: Arc<C>, options: ReconcileOptions) -> Self {
        Self {
            client,
            locks: NameLocks::new(),
            options,
        }
    }

    /// The control plane.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Reconcile one stage, treating failures of an earlier run as failed
    /// dependencies.
    ///
    /// Used by the pipeline so that bindings of a rule that failed in the
    /// routing stage are not attempted.
    pub async fn reconcile_stage_after(
        &self,
        desired: &TopologyDescriptor,
        stage: Stage,
        prior: &ReconciliationReport,
    ) -> Result<ReconciliationReport, DescriptorError> {
        let seed = prior
            .failures()
            .map(|e| (e.kind, e.name.clone()))
            .collect();
        self.run(desired, Some(stage), seed).await
    }

    async fn run(
        &self,
        desired: &TopologyDescriptor,
        stage: Option<Stage>,
        seed_failed: HashSet<StepKey>,
    ) -> Result<ReconciliationReport, DescriptorError> {
        let plan = build_plan(desired)?;
        let steps: IndexedSteps = plan
            .into_iter()
            .filter(|step| stage.map_or(true, |s| step.resource.stage() == s))
            .enumerate()
            .collect();

        info!(
            bus = %desired.event_bus.name,
            stage = %stage.map(|s| s.to_string()).unwrap_or_else(|| "all".to_string()),
            resources = steps.len(),
            concurrent = self.options.concurrent_rules,
            "Reconciling topology"
        );

        let failed = Mutex::new(seed_failed);
        let (shared, groups) = partition(steps);

        let mut entries = Vec::new();
        for (index, step) in &shared {
            entries.push((*index, self.execute(step, &failed).await));
        }

        if self.options.concurrent_rules {
            let runs: Vec<_> = groups
                .iter()
                .map(|group| self.execute_group(group, &failed))
                .collect();
            for group_entries in join_all(runs).await {
                entries.extend(group_entries);
            }
        } else {
            for group in &groups {
                entries.extend(self.execute_group(group, &failed).await);
            }
        }

        entries.sort_by_key(|(index, _)| *index);
        let report = ReconciliationReport {
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
        };

        info!(
            created = report.count("created"),
            updated = report.count("updated"),
            unchanged = report.count("unchanged"),
            failed = report.count("failed"),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn execute_group(
        &self,
        group: &IndexedSteps,
        failed: &Mutex<HashSet<StepKey>>,
    ) -> Vec<(usize, ResourceReport)> {
        let mut entries = Vec::with_capacity(group.len());
        for (index, step) in group {
            entries.push((*index, self.execute(step, failed).await));
        }
        entries
    }

    async fn execute(&self, step: &PlanStep, failed: &Mutex<HashSet<StepKey>>) -> ResourceReport {
        let (kind, name) = step.key();
        let blocked = {
            let failed = failed.lock();
            step.depends_on.iter().find(|dep| failed.contains(*dep)).cloned()
        };

        let outcome = match blocked {
            Some((dep_kind, dep_name)) => {
                warn!(%kind, resource = %name, dependency = %dep_name, "Skipped, dependency failed");
                Outcome::Failed(format!("dependency {dep_kind} {dep_name} failed"))
            }
            None => match &step.resource {
                DesiredResource::EventBus(spec) => self.converge(spec).await,
                DesiredResource::Rule(spec) => self.converge(spec).await,
                DesiredResource::Target(spec) => self.converge(spec).await,
                DesiredResource::Permission(spec) => self.converge(spec).await,
            },
        };

        if outcome.is_failed() {
            failed.lock().insert((kind, name.clone()));
        }
        ResourceReport {
            kind,
            name,
            outcome,
        }
    }

    /// Bring one resource to its desired state.
    async fn converge<R>(&self, desired: &R) -> Outcome
    where
        R: Resource,
        C: ResourceClient<R>,
    {
        let name = desired.resource_name();
        let _guard = self.locks.acquire(&lock_key(R::KIND, &name)).await;

        let current = match ResourceClient::<R>::describe(self.client.as_ref(), &name).await {
            Ok(current) => current,
            Err(e) if e.class() == ErrorClass::Expected => None,
            Err(e) => {
                error!(kind = %R::KIND, resource = %name, error = %e, "Describe failed");
                return Outcome::Failed(e.to_string());
            }
        };

        match current {
            None => self.create(desired, &name).await,
            Some(actual) if actual == *desired => {
                debug!(kind = %R::KIND, resource = %name, "Already in desired state");
                Outcome::Unchanged
            }
            Some(actual) => match R::MUTABILITY {
                Mutability::Immutable => {
                    warn!(
                        kind = %R::KIND,
                        resource = %name,
                        actual = ?actual,
                        "Existing resource differs from desired state; left as is"
                    );
                    Outcome::Unchanged
                }
                Mutability::Mutable => self.update(desired, &name).await,
            },
        }
    }

    async fn create<R>(&self, desired: &R, name: &ResourceName) -> Outcome
    where
        R: Resource,
        C: ResourceClient<R>,
    {
        match ResourceClient::<R>::create(self.client.as_ref(), desired).await {
            Ok(()) => {
                info!(kind = %R::KIND, resource = %name, outcome = "created", "Resource created");
                Outcome::Created
            }
            Err(e) if e.is_benign() => {
                info!(kind = %R::KIND, resource = %name, outcome = "unchanged", "Resource already exists");
                Outcome::Unchanged
            }
            Err(e) => {
                error!(kind = %R::KIND, resource = %name, error = %e, "Create failed");
                Outcome::Failed(e.to_string())
            }
        }
    }

    async fn update<R>(&self, desired: &R, name: &ResourceName) -> Outcome
    where
        R: Resource,
        C: ResourceClient<R>,
    {
        match ResourceClient::<R>::update(self.client.as_ref(), name, desired).await {
            Ok(()) => {
                info!(kind = %R::KIND, resource = %name, outcome = "updated", "Drift repaired");
                Outcome::Updated
            }
            Err(e) if e.is_benign() => Outcome::Unchanged,
            Err(e) => {
                error!(kind = %R::KIND, resource = %name, error = %e, "Update failed");
                Outcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl<C: ControlPlane + 'static> TopologyReconcilerApi for Reconciler<C> {
    async fn reconcile(
        &self,
        desired: &TopologyDescriptor,
    ) -> Result<ReconciliationReport, DescriptorError> {
        let routing = self.reconcile_stage(desired, Stage::Routing).await?;
        let bindings = self
            .reconcile_stage_after(desired, Stage::Bindings, &routing)
            .await?;
        let mut report = routing;
        report.extend(bindings);
        Ok(report)
    }

    async fn reconcile_stage(
        &self,
        desired: &TopologyDescriptor,
        stage: Stage,
    ) -> Result<ReconciliationReport, DescriptorError> {
        self.run(desired, Some(stage), HashSet::new()).await
    }

    fn plan(&self, desired: &TopologyDescriptor) -> Result<Vec<PlanStep>, DescriptorError> {
        build_plan(desired)
    }
}

/// Split steps into rule-independent ones (the bus) and per-rule groups,
/// keeping first-appearance order of the groups.
fn partition(steps: IndexedSteps) -> (IndexedSteps, Vec<IndexedSteps>) {
    let mut shared = Vec::new();
    let mut order: Vec<ResourceName> = Vec::new();
    let mut groups: Vec<IndexedSteps> = Vec::new();

    for (index, step) in steps {
        match step.group.clone() {
            None => shared.push((index, step)),
            Some(group) => {
                let slot = match order.iter().position(|g| *g == group) {
                    Some(slot) => slot,
                    None => {
                        order.push(group);
                        groups.push(Vec::new());
                        groups.len() - 1
                    }
                };
                groups[slot].push((index, step));
            }
        }
    }
    (shared, groups)
}

fn lock_key(kind: ResourceKind, name: &ResourceName) -> String {
    format!("{kind}:{name}")
}
