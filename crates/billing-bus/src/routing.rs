//! # Routing Table
//!
//! Snapshot of rules, their targets and the invocation grants that exist on
//! the functions. The router reads it; it never mutates remote state.

use std::collections::HashSet;

use billing_types::{AccountContext, EventEnvelope, PermissionSpec, RuleSpec, TargetSpec};
use serde::{Deserialize, Serialize};

/// One rule and the targets bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// The rule.
    pub rule: RuleSpec,
    /// ARN of the rule, used to look up grants.
    pub rule_arn: String,
    /// Targets in binding order.
    pub targets: Vec<TargetSpec>,
}

/// Routing snapshot for one bus.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    bus_name: String,
    routes: Vec<RouteEntry>,
    /// (function name, source rule ARN) pairs with a grant in place.
    grants: HashSet<(String, String)>,
}

impl RoutingTable {
    /// Create an empty table for a bus.
    pub fn new(bus_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            routes: Vec::new(),
            grants: HashSet::new(),
        }
    }

    /// Build a table from rules, targets and grants.
    ///
    /// Targets whose rule is not in `rules` are ignored, as the platform
    /// cannot hold such a binding.
    pub fn from_parts(
        bus_name: impl Into<String>,
        account: &AccountContext,
        rules: &[RuleSpec],
        targets: &[TargetSpec],
        permissions: &[PermissionSpec],
    ) -> Self {
        let mut table = Self::new(bus_name);
        for rule in rules.iter().filter(|r| r.bus_name == table.bus_name) {
            let bound = targets
                .iter()
                .filter(|t| t.bus_name == rule.bus_name && t.rule_name == rule.name)
                .cloned()
                .collect();
            table.routes.push(RouteEntry {
                rule: rule.clone(),
                rule_arn: account.rule_arn(&rule.bus_name, &rule.name),
                targets: bound,
            });
        }
        for permission in permissions {
            table.grant(&permission.function_name, &permission.source_arn);
        }
        table
    }

    /// Record a grant.
    pub fn grant(&mut self, function_name: &str, source_arn: &str) {
        self.grants
            .insert((function_name.to_string(), source_arn.to_string()));
    }

    /// Remove a grant.
    pub fn revoke(&mut self, function_name: &str, source_arn: &str) {
        self.grants
            .remove(&(function_name.to_string(), source_arn.to_string()));
    }

    /// Bus this table routes for.
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// All routes.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Routes whose rule selects the envelope.
    pub fn matching(&self, envelope: &EventEnvelope) -> Vec<&RouteEntry> {
        self.routes
            .iter()
            .filter(|entry| entry.rule.selects(envelope))
            .collect()
    }

    /// Whether `function_name` may be invoked on behalf of the rule `rule_arn`.
    pub fn is_authorized(&self, function_name: &str, rule_arn: &str) -> bool {
        self.grants
            .contains(&(function_name.to_string(), rule_arn.to_string()))
    }
}
