//! Shared fixtures: the account, a bundle source that needs no files, and an
//! invoker that behaves like the three processing functions.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_bus::{FunctionInvoker, InvocationError};
use billing_deploy::{
    BundleBuilder, BundleError, BundleSource, CodeBundle, DeployConfig, ProcessingFunction,
};
use billing_types::{AccountContext, EventEnvelope};
use parking_lot::Mutex;
use serde_json::json;

/// Account every scenario deploys into.
pub fn account() -> AccountContext {
    AccountContext::new("ap-southeast-1", "123456789012")
}

/// Configuration with the scenario account.
pub fn config() -> DeployConfig {
    DeployConfig {
        account: account(),
        ..DeployConfig::default()
    }
}

/// Bundles built in memory, one per function. `revision` changes the code.
pub struct StaticBundles {
    /// Mixed into every entry file.
    pub revision: u32,
}

impl StaticBundles {
    /// First revision.
    pub fn new() -> Self {
        Self { revision: 1 }
    }
}

impl Default for StaticBundles {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleSource for StaticBundles {
    fn bundle_for(&self, function: ProcessingFunction) -> Result<CodeBundle, BundleError> {
        let code = format!(
            "# revision {}\ndef lambda_handler(event, context):\n    return '{}'\n",
            self.revision,
            function.name()
        );
        BundleBuilder::new()
            .entry(&function.entry_file(), code.into_bytes())?
            .build()
    }
}

/// Invoker that emits what the deployed functions emit.
///
/// - `risk-agent` emits one risk assessment
/// - `receipt-processing-agent` emits one payment confirmation
/// - `communication-agent` emits nothing
#[derive(Default)]
pub struct SimulatedFunctions {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<Vec<String>>,
}

impl SimulatedFunctions {
    /// Create an invoker with no failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation of `function_name` fail.
    pub fn fail(&self, function_name: &str) {
        self.failing.lock().push(function_name.to_string());
    }

    /// Invocations of `function_name` so far, failed ones included.
    pub fn calls(&self, function_name: &str) -> usize {
        self.calls.lock().get(function_name).copied().unwrap_or(0)
    }

    /// Invocations across all functions.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl FunctionInvoker for SimulatedFunctions {
    async fn invoke(
        &self,
        function_name: &str,
        envelope: &EventEnvelope,
    ) -> Result<Vec<EventEnvelope>, InvocationError> {
        *self
            .calls
            .lock()
            .entry(function_name.to_string())
            .or_default() += 1;

        if self.failing.lock().iter().any(|f| f == function_name) {
            return Err(InvocationError::Failed(format!("{function_name} crashed")));
        }

        let emitted = match function_name {
            "risk-agent" => vec![EventEnvelope::new(
                "billing.risk.agent",
                "Risk Assessment Complete",
                json!({"invoice": envelope.detail, "risk_score": 0.2}),
                envelope.bus.clone(),
            )],
            "receipt-processing-agent" => vec![EventEnvelope::new(
                "billing.payment.received",
                "Payment Confirmation Required",
                json!({"receipt": envelope.detail, "amount": 120.5}),
                envelope.bus.clone(),
            )],
            _ => Vec::new(),
        };
        Ok(emitted)
    }
}

/// Invoice envelope as the invoicing service emits it.
pub fn invoice_created(bus: &str) -> EventEnvelope {
    EventEnvelope::new(
        "billing.invoice.created",
        "New Invoice Generated",
        json!({"invoice_id": "INV-1001", "amount": 250.0}),
        bus,
    )
}

/// Receipt upload envelope.
pub fn receipt_uploaded(bus: &str) -> EventEnvelope {
    EventEnvelope::new(
        "billing.receipt.uploaded",
        "Payment Receipt Received",
        json!({"bucket": "billing-receipts", "key": "r/1.png"}),
        bus,
    )
}

/// Payment confirmation envelope.
pub fn payment_received(bus: &str) -> EventEnvelope {
    EventEnvelope::new(
        "billing.payment.received",
        "Payment Confirmation Required",
        json!({"payment_id": "P-77"}),
        bus,
    )
}
