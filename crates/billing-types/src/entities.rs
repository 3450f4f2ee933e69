//! # Resource Entities
//!
//! Desired-state specifications for every resource the deployer manages.
//!
//! ## Clusters
//!
//! - **Routing topology**: `EventBusSpec`, `RuleSpec`, `EventPattern`, `TargetSpec`
//! - **Authorization**: `PermissionSpec`
//! - **Compute**: `FunctionSpec`

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::EventEnvelope;

// =============================================================================
// IDENTITY
// =============================================================================

/// The kinds of remote resources, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Shared event bus.
    EventBus,
    /// Pattern-matching rule on the bus.
    Rule,
    /// Binding of a rule to a function.
    Target,
    /// Invocation grant on a function.
    Permission,
    /// Serverless processing function.
    Function,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EventBus => "event-bus",
            Self::Rule => "rule",
            Self::Target => "target",
            Self::Permission => "permission",
            Self::Function => "function",
        };
        f.write_str(s)
    }
}

/// Natural key of a remote resource.
///
/// Composite keys are joined with `/`: a target is `bus/rule/target-id`,
/// a permission is `function/statement-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(pub String);

impl ResourceName {
    /// Join key segments into one name.
    pub fn from_parts(parts: &[&str]) -> Self {
        Self(parts.join("/"))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// ROUTING TOPOLOGY
// =============================================================================

/// Named channel for one tenant's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusSpec {
    /// Bus name, unique per deployment.
    pub name: String,
    /// Region the bus lives in.
    pub region: String,
}

impl EventBusSpec {
    /// Natural key of the bus.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName(self.name.clone())
    }
}

/// Whether a rule currently selects events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleState {
    /// Rule is active.
    #[default]
    Enabled,
    /// Rule exists but matches nothing.
    Disabled,
}

/// Event filter over `source` and `detail-type`.
///
/// An envelope matches iff its source is in `source` AND its detail type is
/// in `detail_type`. Both are exact-string membership tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPattern {
    /// Accepted event sources.
    pub source: BTreeSet<String>,
    /// Accepted detail types.
    #[serde(rename = "detail-type")]
    pub detail_type: BTreeSet<String>,
}

impl EventPattern {
    /// Pattern accepting exactly one source and one detail type.
    pub fn single(source: impl Into<String>, detail_type: impl Into<String>) -> Self {
        Self {
            source: BTreeSet::from([source.into()]),
            detail_type: BTreeSet::from([detail_type.into()]),
        }
    }

    /// Check an envelope against the pattern.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        self.source.contains(&envelope.source) && self.detail_type.contains(&envelope.detail_type)
    }

    /// A pattern with an empty set can never match anything.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() || self.detail_type.is_empty()
    }
}

/// Named event filter bound to a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Owning bus.
    pub bus_name: String,
    /// Rule name, unique per bus.
    pub name: String,
    /// Event pattern.
    pub pattern: EventPattern,
    /// Enabled or disabled.
    #[serde(default)]
    pub state: RuleState,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleSpec {
    /// Natural key of the rule.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::from_parts(&[&self.bus_name, &self.name])
    }

    /// Rule matches the envelope and is enabled.
    pub fn selects(&self, envelope: &EventEnvelope) -> bool {
        self.state == RuleState::Enabled
            && envelope.bus == self.bus_name
            && self.pattern.matches(envelope)
    }
}

/// Binding of a rule to one invocable function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Owning bus.
    pub bus_name: String,
    /// Owning rule.
    pub rule_name: String,
    /// Target id, unique within the rule.
    pub id: String,
    /// Function name the target invokes.
    pub function_name: String,
    /// Function ARN the target invokes.
    pub function_arn: String,
}

impl TargetSpec {
    /// Natural key of the target binding.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::from_parts(&[&self.bus_name, &self.rule_name, &self.id])
    }

    /// Natural key of the owning rule.
    pub fn rule_resource_name(&self) -> ResourceName {
        ResourceName::from_parts(&[&self.bus_name, &self.rule_name])
    }
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Grant allowing the router to invoke a function on behalf of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    /// Function the grant is attached to.
    pub function_name: String,
    /// Statement id, unique per function.
    pub statement_id: String,
    /// Invoking principal.
    pub principal: String,
    /// Granted action.
    pub action: String,
    /// ARN of the rule allowed to invoke.
    pub source_arn: String,
}

impl PermissionSpec {
    /// Natural key of the grant.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::from_parts(&[&self.function_name, &self.statement_id])
    }
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Desired deployable state of one processing function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Function name, the natural key across create and update.
    pub name: String,
    /// Runtime identifier, e.g. `python3.11`.
    pub runtime: String,
    /// Handler entry point, e.g. `risk_agent.lambda_handler`.
    pub handler: String,
    /// Invocation timeout in seconds.
    pub timeout_secs: u32,
    /// Memory size in megabytes.
    pub memory_mb: u32,
    /// Environment variables applied as the final configuration step.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
    /// Natural key of the function.
    pub fn resource_name(&self) -> ResourceName {
        ResourceName(self.name.clone())
    }
}
