//! # Topology Descriptor
//!
//! The desired routing topology as one declarative document: a bus, and per
//! rule its pattern, targets and the grants that authorize those targets.
//!
//! ```text
//! TopologyDescriptor
//! ├── event_bus
//! └── rules[]
//!     ├── rule         (pattern, state)
//!     ├── targets[]    (rule → function)
//!     └── permissions[] (function ← rule ARN)
//! ```
//!
//! Validation rejects documents the reconciler could only half-apply.

use std::collections::HashSet;

use billing_bus::RoutingTable;
use billing_types::{
    AccountContext, EventBusSpec, EventPattern, PermissionSpec, RuleSpec, RuleState, TargetSpec,
    EVENTS_PRINCIPAL, INVOKE_ACTION,
};
use serde::{Deserialize, Serialize};

use super::config::DeployConfig;
use super::errors::DescriptorError;
use super::functions::ProcessingFunction;

/// A rule with everything bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBinding {
    /// The rule.
    pub rule: RuleSpec,
    /// Targets of the rule.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    /// Grants authorizing the rule to invoke its targets.
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
}

impl RuleBinding {
    /// Bind `rule` to `functions`, one target and one grant per function.
    pub fn to_functions(
        account: &AccountContext,
        rule: RuleSpec,
        functions: &[ProcessingFunction],
    ) -> Self {
        let rule_arn = account.rule_arn(&rule.bus_name, &rule.name);
        let targets = functions
            .iter()
            .map(|f| TargetSpec {
                bus_name: rule.bus_name.clone(),
                rule_name: rule.name.clone(),
                id: format!("{}-target", f.name()),
                function_name: f.name().to_string(),
                function_arn: account.function_arn(f.name()),
            })
            .collect();
        let permissions = functions
            .iter()
            .map(|f| PermissionSpec {
                function_name: f.name().to_string(),
                statement_id: format!("{}-{}", rule.name, f.name()),
                principal: EVENTS_PRINCIPAL.to_string(),
                action: INVOKE_ACTION.to_string(),
                source_arn: rule_arn.clone(),
            })
            .collect();
        Self {
            rule,
            targets,
            permissions,
        }
    }
}

/// Desired routing topology of one bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    /// The shared bus.
    pub event_bus: EventBusSpec,
    /// Rules in declaration order.
    #[serde(default)]
    pub rules: Vec<RuleBinding>,
}

impl TopologyDescriptor {
    /// Empty topology for a bus.
    pub fn new(event_bus: EventBusSpec) -> Self {
        Self {
            event_bus,
            rules: Vec::new(),
        }
    }

    /// The production billing topology.
    ///
    /// | Rule | Source | Detail-type | Target |
    /// |------|--------|-------------|--------|
    /// | InvoiceCreatedRule | billing.invoice.created | New Invoice Generated | risk-agent |
    /// | CommunicationTriggerRule | billing.risk.agent | Risk Assessment Complete | communication-agent |
    /// | ReceiptProcessingRule | billing.receipt.uploaded | Payment Receipt Received | receipt-processing-agent |
    /// | PaymentConfirmationRule | billing.payment.received | Payment Confirmation Required | communication-agent |
    pub fn billing_default(config: &DeployConfig) -> Self {
        let bus = &config.bus_name;
        let rule = |name: &str, source: &str, detail_type: &str, description: &str| RuleSpec {
            bus_name: bus.clone(),
            name: name.to_string(),
            pattern: EventPattern::single(source, detail_type),
            state: RuleState::Enabled,
            description: Some(description.to_string()),
        };

        let bindings = [
            (
                rule(
                    "InvoiceCreatedRule",
                    "billing.invoice.created",
                    "New Invoice Generated",
                    "Route new invoices to risk assessment",
                ),
                ProcessingFunction::RiskAgent,
            ),
            (
                rule(
                    "CommunicationTriggerRule",
                    "billing.risk.agent",
                    "Risk Assessment Complete",
                    "Route completed risk assessments to customer communication",
                ),
                ProcessingFunction::CommunicationAgent,
            ),
            (
                rule(
                    "ReceiptProcessingRule",
                    "billing.receipt.uploaded",
                    "Payment Receipt Received",
                    "Route uploaded receipts to receipt processing",
                ),
                ProcessingFunction::ReceiptProcessingAgent,
            ),
            (
                rule(
                    "PaymentConfirmationRule",
                    "billing.payment.received",
                    "Payment Confirmation Required",
                    "Route confirmed payments to customer communication",
                ),
                ProcessingFunction::CommunicationAgent,
            ),
        ];

        Self {
            event_bus: EventBusSpec {
                name: bus.clone(),
                region: config.account.region.clone(),
            },
            rules: bindings
                .into_iter()
                .map(|(spec, function)| RuleBinding::to_functions(&config.account, spec, &[function]))
                .collect(),
        }
    }

    /// Parse a descriptor document and validate it.
    pub fn from_json(document: &str) -> Result<Self, DescriptorError> {
        let descriptor: Self =
            serde_json::from_str(document).map_err(|e| DescriptorError::Parse(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Render as a pretty-printed document.
    pub fn to_json_pretty(&self) -> Result<String, DescriptorError> {
        serde_json::to_string_pretty(self).map_err(|e| DescriptorError::Render(e.to_string()))
    }

    /// All rule specs.
    pub fn rule_specs(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().map(|b| &b.rule)
    }

    /// All target specs.
    pub fn target_specs(&self) -> impl Iterator<Item = &TargetSpec> {
        self.rules.iter().flat_map(|b| b.targets.iter())
    }

    /// All permission specs.
    pub fn permission_specs(&self) -> impl Iterator<Item = &PermissionSpec> {
        self.rules.iter().flat_map(|b| b.permissions.iter())
    }

    /// Distinct function names referenced by targets, in first-use order.
    pub fn target_functions(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.target_specs()
            .map(|t| t.function_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Routing table this topology yields once fully applied.
    pub fn routing_table(&self, account: &AccountContext) -> RoutingTable {
        let rules: Vec<_> = self.rule_specs().cloned().collect();
        let targets: Vec<_> = self.target_specs().cloned().collect();
        let permissions: Vec<_> = self.permission_specs().cloned().collect();
        RoutingTable::from_parts(&self.event_bus.name, account, &rules, &targets, &permissions)
    }

    /// Check structural consistency.
    ///
    /// Every target must sit under the rule it names, every grant must
    /// authorize a target of its rule, and every target must be granted.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let bus = &self.event_bus.name;
        let mut rule_names = HashSet::new();
        let mut statements = HashSet::new();

        for binding in &self.rules {
            let rule = &binding.rule;
            if &rule.bus_name != bus {
                return Err(DescriptorError::BusMismatch(format!("rule {}", rule.name)));
            }
            if !rule_names.insert(rule.name.as_str()) {
                return Err(DescriptorError::DuplicateRule(rule.name.clone()));
            }
            if rule.pattern.is_empty() {
                return Err(DescriptorError::EmptyPattern(rule.name.clone()));
            }

            let rule_suffix = format!(":rule/{}/{}", rule.bus_name, rule.name);
            let mut target_ids = HashSet::new();
            for target in &binding.targets {
                if &target.bus_name != bus {
                    return Err(DescriptorError::BusMismatch(format!("target {}", target.id)));
                }
                if target.rule_name != rule.name {
                    return Err(DescriptorError::MisplacedTarget {
                        rule: rule.name.clone(),
                        target_id: target.id.clone(),
                        named: target.rule_name.clone(),
                    });
                }
                if !target_ids.insert(target.id.as_str()) {
                    return Err(DescriptorError::DuplicateTarget {
                        rule: rule.name.clone(),
                        target_id: target.id.clone(),
                    });
                }
                let granted = binding.permissions.iter().any(|p| {
                    p.function_name == target.function_name && p.source_arn.ends_with(&rule_suffix)
                });
                if !granted {
                    return Err(DescriptorError::UngrantedTarget {
                        rule: rule.name.clone(),
                        target_id: target.id.clone(),
                    });
                }
            }

            for permission in &binding.permissions {
                let authorizes_target = permission.source_arn.ends_with(&rule_suffix)
                    && binding
                        .targets
                        .iter()
                        .any(|t| t.function_name == permission.function_name);
                if !authorizes_target {
                    return Err(DescriptorError::DanglingPermission {
                        rule: rule.name.clone(),
                        function: permission.function_name.clone(),
                        statement_id: permission.statement_id.clone(),
                    });
                }
                if !statements.insert((
                    permission.function_name.as_str(),
                    permission.statement_id.as_str(),
                )) {
                    return Err(DescriptorError::DuplicateStatement {
                        function: permission.function_name.clone(),
                        statement_id: permission.statement_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
