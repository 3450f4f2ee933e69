//! # Event Router
//!
//! Matches envelopes against the routing table and delivers them to the
//! bound functions.
//!
//! Each (rule, target) pair is one independent delivery attempt: a failing
//! target never blocks its siblings, and a missing grant is a hard failure
//! for that delivery only.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use billing_types::{EventEnvelope, TargetSpec};
use futures::future::join_all;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::routing::RoutingTable;

/// Errors raised by the router itself (not by deliveries).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Envelope addressed to a bus this router does not serve.
    #[error("unknown event bus: expected {expected}, got {got}")]
    UnknownBus {
        /// Bus served by this router.
        expected: String,
        /// Bus named by the envelope.
        got: String,
    },
}

/// Errors returned by a function invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The handler ran and failed.
    #[error("function failed: {0}")]
    Failed(String),

    /// The function could not be reached.
    #[error("function unavailable: {0}")]
    Unavailable(String),
}

/// Invokes processing functions - outbound port.
///
/// A successful invocation returns the envelopes the function emitted, which
/// re-enter the router in chained dispatch.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invoke `function_name` with one envelope.
    async fn invoke(
        &self,
        function_name: &str,
        envelope: &EventEnvelope,
    ) -> Result<Vec<EventEnvelope>, InvocationError>;
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Function invoked successfully.
    Delivered,
    /// No grant for this function on behalf of this rule.
    PermissionDenied,
    /// Invocation failed.
    Failed(String),
}

/// One (rule, target) delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Rule that matched.
    pub rule_name: String,
    /// Target id within the rule.
    pub target_id: String,
    /// Function the target invokes.
    pub function_name: String,
    /// Outcome.
    pub outcome: DeliveryOutcome,
    /// Envelopes emitted by the function.
    pub emitted: Vec<EventEnvelope>,
}

/// Result of dispatching one envelope.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Logical id of the dispatched envelope.
    pub envelope_id: String,
    /// Names of the rules that matched.
    pub matched_rules: Vec<String>,
    /// One entry per (rule, target).
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    /// Number of successful invocations of `function_name`.
    pub fn invocations_of(&self, function_name: &str) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.function_name == function_name && d.outcome == DeliveryOutcome::Delivered)
            .count()
    }

    /// Delivered, permission-denied and failed delivery counts.
    pub fn outcome_counts(&self) -> (usize, usize, usize) {
        self.deliveries
            .iter()
            .fold((0, 0, 0), |(ok, denied, failed), d| match d.outcome {
                DeliveryOutcome::Delivered => (ok + 1, denied, failed),
                DeliveryOutcome::PermissionDenied => (ok, denied + 1, failed),
                DeliveryOutcome::Failed(_) => (ok, denied, failed + 1),
            })
    }

    /// Deliveries that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries
            .iter()
            .filter(|d| d.outcome != DeliveryOutcome::Delivered)
    }

    /// All envelopes emitted by the invoked functions.
    pub fn emitted(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.deliveries.iter().flat_map(|d| d.emitted.iter())
    }
}

/// Result of a chained dispatch.
#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    /// Every dispatch, in the order performed.
    pub dispatches: Vec<DispatchReport>,
    /// Emitted envelopes addressed to another bus.
    pub unrouted: Vec<EventEnvelope>,
    /// Envelopes still pending when the hop limit was reached.
    pub truncated: Vec<EventEnvelope>,
}

impl ChainReport {
    /// Total successful invocations of `function_name` across the chain.
    pub fn invocations_of(&self, function_name: &str) -> usize {
        self.dispatches
            .iter()
            .map(|d| d.invocations_of(function_name))
            .sum()
    }

    /// Rules matched across the chain, in dispatch order.
    pub fn matched_rules(&self) -> Vec<String> {
        self.dispatches
            .iter()
            .flat_map(|d| d.matched_rules.iter().cloned())
            .collect()
    }
}

struct PlannedDelivery {
    rule_name: String,
    target: TargetSpec,
    authorized: bool,
}

/// Runtime event router for one bus.
pub struct EventRouter<I: FunctionInvoker> {
    table: RwLock<RoutingTable>,
    invoker: Arc<I>,
}

impl<I: FunctionInvoker> EventRouter<I> {
    /// Create a router over a routing table.
    pub fn new(table: RoutingTable, invoker: Arc<I>) -> Self {
        Self {
            table: RwLock::new(table),
            invoker,
        }
    }

    /// Swap in a fresh routing snapshot, e.g. after reconciliation.
    pub fn replace_table(&self, table: RoutingTable) {
        *self.table.write() = table;
    }

    /// Bus served by this router.
    pub fn bus_name(&self) -> String {
        self.table.read().bus_name().to_string()
    }

    /// Match one envelope and deliver it to every bound target.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> Result<DispatchReport, RoutingError> {
        let (matched_rules, planned) = {
            let table = self.table.read();
            if envelope.bus != table.bus_name() {
                return Err(RoutingError::UnknownBus {
                    expected: table.bus_name().to_string(),
                    got: envelope.bus.clone(),
                });
            }

            let mut names = Vec::new();
            let mut planned = Vec::new();
            for entry in table.matching(envelope) {
                names.push(entry.rule.name.clone());
                for target in &entry.targets {
                    planned.push(PlannedDelivery {
                        rule_name: entry.rule.name.clone(),
                        target: target.clone(),
                        authorized: table.is_authorized(&target.function_name, &entry.rule_arn),
                    });
                }
            }
            (names, planned)
        };

        debug!(
            source = %envelope.source,
            detail_type = %envelope.detail_type,
            rules = ?matched_rules,
            "Envelope matched"
        );

        let deliveries = join_all(planned.into_iter().map(|p| self.deliver(p, envelope))).await;

        let report = DispatchReport {
            envelope_id: envelope.logical_id(),
            matched_rules,
            deliveries,
        };
        #[cfg(feature = "metrics")]
        {
            let (delivered, denied, failed) = report.outcome_counts();
            billing_telemetry::record_dispatch(delivered, denied, failed);
        }
        Ok(report)
    }

    /// Dispatch an envelope and keep routing whatever the invoked functions
    /// emit, breadth first, for at most `max_hops` rounds.
    pub async fn run_chain(
        &self,
        envelope: EventEnvelope,
        max_hops: usize,
    ) -> Result<ChainReport, RoutingError> {
        let bus_name = self.bus_name();
        let mut report = ChainReport::default();
        let mut frontier = VecDeque::from([envelope]);

        for hop in 0..max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = VecDeque::new();
            while let Some(current) = frontier.pop_front() {
                // The first envelope must belong to this bus; emitted ones may not.
                if current.bus != bus_name && hop > 0 {
                    warn!(bus = %current.bus, "Emitted envelope targets another bus");
                    report.unrouted.push(current);
                    continue;
                }
                let dispatch = self.dispatch(&current).await?;
                next.extend(dispatch.emitted().cloned());
                report.dispatches.push(dispatch);
            }
            frontier = next;
        }

        if !frontier.is_empty() {
            warn!(pending = frontier.len(), max_hops, "Hop limit reached");
            report.truncated.extend(frontier);
        }
        Ok(report)
    }

    async fn deliver(&self, planned: PlannedDelivery, envelope: &EventEnvelope) -> Delivery {
        let PlannedDelivery {
            rule_name,
            target,
            authorized,
        } = planned;

        if !authorized {
            warn!(
                rule = %rule_name,
                function = %target.function_name,
                "Delivery rejected: no invoke permission for rule"
            );
            return Delivery {
                rule_name,
                target_id: target.id,
                function_name: target.function_name,
                outcome: DeliveryOutcome::PermissionDenied,
                emitted: Vec::new(),
            };
        }

        match self.invoker.invoke(&target.function_name, envelope).await {
            Ok(emitted) => {
                info!(
                    rule = %rule_name,
                    function = %target.function_name,
                    emitted = emitted.len(),
                    "Delivered"
                );
                Delivery {
                    rule_name,
                    target_id: target.id,
                    function_name: target.function_name,
                    outcome: DeliveryOutcome::Delivered,
                    emitted,
                }
            }
            Err(e) => {
                warn!(
                    rule = %rule_name,
                    function = %target.function_name,
                    error = %e,
                    "Delivery failed"
                );
                Delivery {
                    rule_name,
                    target_id: target.id,
                    function_name: target.function_name,
                    outcome: DeliveryOutcome::Failed(e.to_string()),
                    emitted: Vec::new(),
                }
            }
        }
    }
}
