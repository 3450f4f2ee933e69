//! # Resource Identifiers
//!
//! ARN construction for the resources the deployer manages. Region and
//! account are always supplied by the caller, never read from the
//! environment here.

use serde::{Deserialize, Serialize};

/// Region and account a deployment targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// Cloud region, e.g. `ap-southeast-1`.
    pub region: String,
    /// Twelve digit account identifier.
    pub account_id: String,
}

impl AccountContext {
    /// Create a new account context.
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
        }
    }

    /// ARN of a serverless function.
    pub fn function_arn(&self, function_name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            self.region, self.account_id, function_name
        )
    }

    /// ARN of an event bus.
    pub fn event_bus_arn(&self, bus_name: &str) -> String {
        format!(
            "arn:aws:events:{}:{}:event-bus/{}",
            self.region, self.account_id, bus_name
        )
    }

    /// ARN of a rule on a custom event bus.
    pub fn rule_arn(&self, bus_name: &str, rule_name: &str) -> String {
        format!(
            "arn:aws:events:{}:{}:rule/{}/{}",
            self.region, self.account_id, bus_name, rule_name
        )
    }

    /// ARN of an IAM role.
    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, role_name)
    }
}
