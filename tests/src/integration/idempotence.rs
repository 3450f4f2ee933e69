//! # Convergence
//!
//! Re-running, racing and partially failing deployments must all converge
//! to one copy of every resource.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use billing_bus::{EventRouter, DEFAULT_MAX_HOPS};
    use billing_deploy::{
        DeployAction, DeployTarget, DeploymentPipeline, InMemoryControlPlane, Operation, Outcome,
        ReconcileOptions, RetryPolicy, RetryingControlPlane, TopologyDescriptor,
    };
    use billing_types::{ControlPlaneError, EventPattern, ResourceKind};

    use crate::fixtures::{account, config, invoice_created, SimulatedFunctions, StaticBundles};

    const BUS: &str = "billing-events";

    fn pipeline(
        plane: &Arc<InMemoryControlPlane>,
        revision: u32,
    ) -> DeploymentPipeline<InMemoryControlPlane, StaticBundles> {
        DeploymentPipeline::new(config(), plane.clone(), StaticBundles { revision })
    }

    #[tokio::test]
    async fn test_second_run_changes_no_topology() {
        let plane = Arc::new(InMemoryControlPlane::new());
        pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        let before = plane.snapshot();
        plane.reset_calls();

        let report = pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        let after = plane.snapshot();

        assert!(report.topology.is_noop(), "{report}");
        assert_eq!(before.buses, after.buses);
        assert_eq!(before.rules, after.rules);
        assert_eq!(before.targets, after.targets);
        assert_eq!(before.permissions, after.permissions);
        for kind in [
            ResourceKind::EventBus,
            ResourceKind::Rule,
            ResourceKind::Target,
            ResourceKind::Permission,
        ] {
            assert_eq!(plane.calls(kind, Operation::Create), 0, "{kind}");
            assert_eq!(plane.calls(kind, Operation::Update), 0, "{kind}");
        }
    }

    #[tokio::test]
    async fn test_new_revision_replaces_code() {
        let plane = Arc::new(InMemoryControlPlane::new());
        pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        let first = plane.function("risk-agent").unwrap();

        let report = pipeline(&plane, 2)
            .run(DeployTarget::Function(billing_deploy::ProcessingFunction::RiskAgent))
            .await
            .unwrap();
        let second = plane.function("risk-agent").unwrap();

        assert_eq!(
            report.functions[0].result.as_ref().unwrap().action,
            DeployAction::Updated
        );
        assert_ne!(first.code_sha256, second.code_sha256);
        assert!(second.revision > first.revision);
        // Other functions untouched.
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 1);
    }

    #[tokio::test]
    async fn test_parallel_runs_converge_once() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.set_latency(Some(Duration::from_millis(1)));

        let a = pipeline(&plane, 1);
        let b = pipeline(&plane, 1);
        let (ra, rb) = tokio::join!(a.run(DeployTarget::All), b.run(DeployTarget::All));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert!(ra.is_success(), "{ra}");
        assert!(rb.is_success(), "{rb}");
        assert_eq!(ra.topology.count("created") + rb.topology.count("created"), 13);

        let snapshot = plane.snapshot();
        assert_eq!(snapshot.buses.len(), 1);
        assert_eq!(snapshot.rules.len(), 4);
        assert_eq!(snapshot.targets.len(), 4);
        assert_eq!(snapshot.permissions.len(), 4);
        assert_eq!(snapshot.functions.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_rule_trees_match_sequential() {
        let sequential = Arc::new(InMemoryControlPlane::new());
        pipeline(&sequential, 1).run(DeployTarget::All).await.unwrap();

        let concurrent = Arc::new(InMemoryControlPlane::new());
        DeploymentPipeline::with_descriptor(
            config(),
            TopologyDescriptor::billing_default(&config()),
            concurrent.clone(),
            StaticBundles::new(),
            ReconcileOptions {
                concurrent_rules: true,
            },
        )
        .run(DeployTarget::All)
        .await
        .unwrap();

        let (s, c) = (sequential.snapshot(), concurrent.snapshot());
        assert_eq!(s.buses, c.buses);
        assert_eq!(s.rules, c.rules);
        assert_eq!(s.targets, c.targets);
        assert_eq!(s.permissions, c.permissions);
    }

    #[tokio::test]
    async fn test_drifted_rule_repaired_and_routing_restored() {
        let plane = Arc::new(InMemoryControlPlane::new());
        pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();

        let mut drifted = plane
            .snapshot()
            .rules
            .values()
            .find(|r| r.name == "InvoiceCreatedRule")
            .cloned()
            .unwrap();
        drifted.pattern = EventPattern::single("billing.invoice.created", "Invoice Draft");
        plane.put(drifted);

        let functions = Arc::new(SimulatedFunctions::new());
        let router = EventRouter::new(plane.routing_table(BUS, &account()), functions.clone());
        let chain = router
            .run_chain(invoice_created(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();
        assert_eq!(chain.invocations_of("risk-agent"), 0);

        let report = pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        assert_eq!(
            report
                .topology
                .outcome_of(ResourceKind::Rule, "billing-events/InvoiceCreatedRule"),
            Some(&Outcome::Updated)
        );
        assert_eq!(report.topology.count("updated"), 1);

        router.replace_table(plane.routing_table(BUS, &account()));
        let chain = router
            .run_chain(invoice_created(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();
        assert_eq!(chain.invocations_of("risk-agent"), 1);
        assert_eq!(chain.invocations_of("communication-agent"), 1);
    }

    #[tokio::test]
    async fn test_failed_rule_isolated_then_recovered() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_always(
            ResourceKind::Rule,
            Operation::Create,
            "billing-events/ReceiptProcessingRule",
            ControlPlaneError::PermissionDenied("events:PutRule".into()),
        );

        let report = pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        // Rule, its target and its grant.
        assert_eq!(report.topology.count("failed"), 3);
        assert_eq!(report.topology.count("created"), 10);
        assert!(report.functions.iter().all(|f| f.result.is_ok()));

        plane.clear_faults();
        let report = pipeline(&plane, 1).run(DeployTarget::All).await.unwrap();
        assert!(report.is_success(), "{report}");
        assert_eq!(report.topology.count("created"), 3);
        assert_eq!(report.topology.count("unchanged"), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_faults_absorbed_by_retry() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_next(
            ResourceKind::Rule,
            Operation::Create,
            2,
            ControlPlaneError::TransientNetwork("connection reset".into()),
        );
        plane.fail_next(
            ResourceKind::Function,
            Operation::UpdateCode,
            1,
            ControlPlaneError::Timeout(30_000),
        );
        let retrying = Arc::new(RetryingControlPlane::new(
            plane.clone(),
            RetryPolicy::default(),
            Duration::from_secs(30),
        ));

        let first = DeploymentPipeline::new(config(), retrying.clone(), StaticBundles::new())
            .run(DeployTarget::All)
            .await
            .unwrap();
        assert!(first.is_success(), "{first}");

        let second = DeploymentPipeline::new(config(), retrying, StaticBundles::new())
            .run(DeployTarget::All)
            .await
            .unwrap();
        assert!(second.is_success(), "{second}");
        // 3 functions + 1 retried
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_transient_fault_fails_after_bound() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_always(
            ResourceKind::EventBus,
            Operation::Create,
            "billing-events",
            ControlPlaneError::TransientNetwork("unreachable".into()),
        );
        let retrying = Arc::new(RetryingControlPlane::new(
            plane.clone(),
            RetryPolicy::default(),
            Duration::from_secs(30),
        ));

        let report = DeploymentPipeline::new(config(), retrying, StaticBundles::new())
            .run(DeployTarget::All)
            .await
            .unwrap();

        assert_eq!(plane.calls(ResourceKind::EventBus, Operation::Create), 3);
        assert_eq!(report.topology.count("failed"), 13);
        // Functions do not depend on the bus.
        assert!(report.functions.iter().all(|f| f.result.is_ok()));
    }
}
