//! # Matching Contract
//!
//! The production topology as the router sees it: exact-string conjunction
//! matching, fan-out per rule, bus scoping.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use billing_bus::{EventRouter, RoutingError};
    use billing_deploy::TopologyDescriptor;
    use billing_types::EventEnvelope;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::fixtures::{
        account, config, invoice_created, payment_received, receipt_uploaded, SimulatedFunctions,
    };

    const BUS: &str = "billing-events";

    /// (source, detail-type) of every production rule.
    const PAIRS: [(&str, &str); 4] = [
        ("billing.invoice.created", "New Invoice Generated"),
        ("billing.risk.agent", "Risk Assessment Complete"),
        ("billing.receipt.uploaded", "Payment Receipt Received"),
        ("billing.payment.received", "Payment Confirmation Required"),
    ];

    fn router() -> (EventRouter<SimulatedFunctions>, Arc<SimulatedFunctions>) {
        let descriptor = TopologyDescriptor::billing_default(&config());
        let functions = Arc::new(SimulatedFunctions::new());
        let router = EventRouter::new(descriptor.routing_table(&account()), functions.clone());
        (router, functions)
    }

    fn matched(envelope: &EventEnvelope) -> Vec<String> {
        let descriptor = TopologyDescriptor::billing_default(&config());
        descriptor
            .routing_table(&account())
            .matching(envelope)
            .iter()
            .map(|entry| entry.rule.name.clone())
            .collect()
    }

    #[test]
    fn test_invoice_matches_only_invoice_rule() {
        assert_eq!(matched(&invoice_created(BUS)), vec!["InvoiceCreatedRule"]);
    }

    #[test]
    fn test_each_production_pair_matches_exactly_one_rule() {
        for (source, detail_type) in PAIRS {
            let envelope = EventEnvelope::new(source, detail_type, json!({}), BUS);
            assert_eq!(matched(&envelope).len(), 1, "{source} / {detail_type}");
        }
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let envelope = EventEnvelope::new(
            "billing.invoice.created",
            "new invoice generated",
            json!({}),
            BUS,
        );
        assert!(matched(&envelope).is_empty());
    }

    #[test]
    fn test_detail_never_affects_matching() {
        let mut envelope = invoice_created(BUS);
        envelope.detail = json!({"source": "billing.payment.received", "nested": [1, 2, 3]});
        assert_eq!(matched(&envelope), vec!["InvoiceCreatedRule"]);
    }

    #[tokio::test]
    async fn test_payment_reaches_communication_agent_once() {
        let (router, functions) = router();
        let report = router.dispatch(&payment_received(BUS)).await.unwrap();

        assert_eq!(report.matched_rules, vec!["PaymentConfirmationRule"]);
        assert_eq!(report.invocations_of("communication-agent"), 1);
        assert_eq!(functions.calls("communication-agent"), 1);
        assert_eq!(functions.calls("risk-agent"), 0);
        assert_eq!(functions.calls("receipt-processing-agent"), 0);
    }

    #[tokio::test]
    async fn test_receipt_dispatch_does_not_chain() {
        let (router, functions) = router();
        let report = router.dispatch(&receipt_uploaded(BUS)).await.unwrap();

        assert_eq!(report.invocations_of("receipt-processing-agent"), 1);
        assert_eq!(report.emitted().count(), 1);
        // Single dispatch only; the emitted confirmation is not routed.
        assert_eq!(functions.calls("communication-agent"), 0);
    }

    #[tokio::test]
    async fn test_unmatched_envelope_invokes_nothing() {
        let (router, functions) = router();
        let envelope = EventEnvelope::new("billing.audit", "Audit Trail", json!({}), BUS);

        let report = router.dispatch(&envelope).await.unwrap();
        assert!(report.matched_rules.is_empty());
        assert!(report.deliveries.is_empty());
        assert_eq!(functions.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_foreign_bus_rejected() {
        let (router, functions) = router();
        let err = router
            .dispatch(&invoice_created("default"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RoutingError::UnknownBus {
                expected: BUS.to_string(),
                got: "default".to_string(),
            }
        );
        assert_eq!(functions.total_calls(), 0);
    }

    proptest! {
        #[test]
        fn prop_mixed_pairs_never_match(i in 0usize..4, j in 0usize..4) {
            prop_assume!(i != j);
            let envelope = EventEnvelope::new(PAIRS[i].0, PAIRS[j].1, json!({}), BUS);
            prop_assert!(matched(&envelope).is_empty());
        }

        #[test]
        fn prop_unknown_sources_never_match(
            source in "[a-z]{1,8}\\.[a-z]{1,8}",
            j in 0usize..4,
        ) {
            let envelope = EventEnvelope::new(source, PAIRS[j].1, json!({}), BUS);
            prop_assert!(matched(&envelope).is_empty());
        }

        #[test]
        fn prop_padded_strings_never_match(i in 0usize..4, pad in "[ \t]{1,3}") {
            let envelope = EventEnvelope::new(
                format!("{}{}", PAIRS[i].0, pad),
                PAIRS[i].1,
                json!({}),
                BUS,
            );
            prop_assert!(matched(&envelope).is_empty());
        }
    }
}
