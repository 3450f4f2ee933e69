//! # Reconcile → Route
//!
//! Deploy the pipeline into an in-memory control plane, export what the
//! plane actually holds as a routing table and drive envelopes through it.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use billing_bus::{
        DeliveryOutcome, EventPublisher, EventRouter, IdempotentInvoker, DEFAULT_MAX_HOPS,
    };
    use billing_deploy::{
        DeployTarget, DeploymentPipeline, InMemoryControlPlane, Operation, ProcessingFunction,
        Reconciler, RuleBinding, Stage, TopologyDescriptor, TopologyReconcilerApi,
    };
    use billing_types::{ControlPlaneError, EventBusSpec, EventPattern, ResourceKind, RuleSpec, RuleState};
    use serde_json::json;

    use crate::fixtures::{
        account, config, invoice_created, payment_received, receipt_uploaded, SimulatedFunctions,
        StaticBundles,
    };

    const BUS: &str = "billing-events";

    async fn deployed() -> Arc<InMemoryControlPlane> {
        let plane = Arc::new(InMemoryControlPlane::new());
        let report = DeploymentPipeline::new(config(), plane.clone(), StaticBundles::new())
            .run(DeployTarget::All)
            .await
            .unwrap();
        assert!(report.is_success(), "{report}");
        plane
    }

    fn router_over(
        plane: &InMemoryControlPlane,
    ) -> (EventRouter<SimulatedFunctions>, Arc<SimulatedFunctions>) {
        let functions = Arc::new(SimulatedFunctions::new());
        let router = EventRouter::new(plane.routing_table(BUS, &account()), functions.clone());
        (router, functions)
    }

    #[tokio::test]
    async fn test_invoice_chain_reaches_communication() {
        let plane = deployed().await;
        let (router, functions) = router_over(&plane);

        let chain = router
            .run_chain(invoice_created(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();

        assert_eq!(
            chain.matched_rules(),
            vec!["InvoiceCreatedRule", "CommunicationTriggerRule"]
        );
        assert_eq!(chain.invocations_of("risk-agent"), 1);
        assert_eq!(chain.invocations_of("communication-agent"), 1);
        assert_eq!(functions.calls("receipt-processing-agent"), 0);
        assert!(chain.truncated.is_empty());
        assert!(chain.unrouted.is_empty());
    }

    #[tokio::test]
    async fn test_receipt_chain_reaches_communication() {
        let plane = deployed().await;
        let (router, _) = router_over(&plane);

        let chain = router
            .run_chain(receipt_uploaded(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();

        assert_eq!(
            chain.matched_rules(),
            vec!["ReceiptProcessingRule", "PaymentConfirmationRule"]
        );
        assert_eq!(chain.invocations_of("receipt-processing-agent"), 1);
        assert_eq!(chain.invocations_of("communication-agent"), 1);
        assert_eq!(chain.invocations_of("risk-agent"), 0);
    }

    #[tokio::test]
    async fn test_hop_limit_truncates_chain() {
        let plane = deployed().await;
        let (router, _) = router_over(&plane);

        let chain = router.run_chain(invoice_created(BUS), 1).await.unwrap();
        assert_eq!(chain.invocations_of("risk-agent"), 1);
        assert_eq!(chain.invocations_of("communication-agent"), 0);
        assert_eq!(chain.truncated.len(), 1);
        assert_eq!(chain.truncated[0].source, "billing.risk.agent");
    }

    #[tokio::test]
    async fn test_routing_stage_alone_delivers_nothing() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let descriptor = TopologyDescriptor::billing_default(&config());
        let report = Reconciler::new(plane.clone())
            .reconcile_stage(&descriptor, Stage::Routing)
            .await
            .unwrap();
        assert_eq!(report.count("created"), 5);

        let (router, functions) = router_over(&plane);
        let dispatch = router.dispatch(&invoice_created(BUS)).await.unwrap();
        assert_eq!(dispatch.matched_rules, vec!["InvoiceCreatedRule"]);
        assert!(dispatch.deliveries.is_empty());
        assert_eq!(functions.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_grant_denies_delivery() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_always(
            ResourceKind::Permission,
            Operation::Create,
            "communication-agent/PaymentConfirmationRule-communication-agent",
            ControlPlaneError::PermissionDenied("lambda:AddPermission".into()),
        );
        let report = DeploymentPipeline::new(config(), plane.clone(), StaticBundles::new())
            .run(DeployTarget::All)
            .await
            .unwrap();
        assert_eq!(report.failure_count(), 1);

        let (router, functions) = router_over(&plane);
        let dispatch = router.dispatch(&payment_received(BUS)).await.unwrap();
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(dispatch.deliveries[0].outcome, DeliveryOutcome::PermissionDenied);
        assert_eq!(functions.calls("communication-agent"), 0);

        // The grant for the other rule on the same function is intact.
        let chain = router
            .run_chain(invoice_created(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();
        assert_eq!(chain.invocations_of("communication-agent"), 1);
    }

    #[tokio::test]
    async fn test_fan_out_targets_fail_independently() {
        let account = account();
        let mut descriptor = TopologyDescriptor::new(EventBusSpec {
            name: BUS.into(),
            region: account.region.clone(),
        });
        descriptor.rules.push(RuleBinding::to_functions(
            &account,
            RuleSpec {
                bus_name: BUS.into(),
                name: "PaymentConfirmationRule".into(),
                pattern: EventPattern::single(
                    "billing.payment.received",
                    "Payment Confirmation Required",
                ),
                state: RuleState::Enabled,
                description: None,
            },
            &[
                ProcessingFunction::CommunicationAgent,
                ProcessingFunction::ReceiptProcessingAgent,
            ],
        ));
        descriptor.validate().unwrap();

        let functions = Arc::new(SimulatedFunctions::new());
        functions.fail("communication-agent");
        let router = EventRouter::new(descriptor.routing_table(&account), functions.clone());

        let dispatch = router.dispatch(&payment_received(BUS)).await.unwrap();
        assert_eq!(dispatch.deliveries.len(), 2);
        assert_eq!(dispatch.invocations_of("receipt-processing-agent"), 1);
        assert_eq!(dispatch.failures().count(), 1);
        assert_eq!(functions.calls("communication-agent"), 1);
    }

    #[tokio::test]
    async fn test_disabled_rule_stops_routing() {
        let plane = deployed().await;
        let mut rule = plane
            .snapshot()
            .rules
            .values()
            .find(|r| r.name == "InvoiceCreatedRule")
            .cloned()
            .unwrap();
        rule.state = RuleState::Disabled;
        plane.put(rule);

        let (router, functions) = router_over(&plane);
        let dispatch = router.dispatch(&invoice_created(BUS)).await.unwrap();
        assert!(dispatch.matched_rules.is_empty());
        assert_eq!(functions.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_publish_over_deployed_table() {
        let plane = deployed().await;
        let (router, functions) = router_over(&plane);

        let envelopes: Vec<_> = (0..23)
            .map(|i| {
                let mut envelope = payment_received(BUS);
                envelope.detail = json!({"payment_id": format!("P-{i}")});
                envelope
            })
            .collect();
        let report = router.publish_batch(envelopes).await;

        assert_eq!(report.requests, 3);
        assert_eq!(report.accepted, 23);
        assert_eq!(functions.calls("communication-agent"), 23);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_suppressed_by_consumer() {
        let plane = deployed().await;
        let functions = Arc::new(IdempotentInvoker::new(SimulatedFunctions::new()));
        let router = EventRouter::new(plane.routing_table(BUS, &account()), functions.clone());

        router.dispatch(&payment_received(BUS)).await.unwrap();
        router.dispatch(&payment_received(BUS)).await.unwrap();

        assert_eq!(functions.inner().calls("communication-agent"), 1);
    }
}
