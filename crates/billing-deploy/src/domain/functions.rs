//! # Function Catalog
//!
//! The three processing functions of the billing pipeline, their handler
//! modules and the environment each one receives.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use billing_types::FunctionSpec;

use super::config::DeployConfig;

/// Handler function name inside each entry module.
pub const HANDLER_FUNCTION: &str = "lambda_handler";

/// A processing function of the billing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessingFunction {
    /// Scores new invoices.
    RiskAgent,
    /// Sends customer communication.
    CommunicationAgent,
    /// Extracts payment data from uploaded receipts.
    ReceiptProcessingAgent,
}

impl ProcessingFunction {
    /// All functions in deployment order.
    pub const ALL: [ProcessingFunction; 3] = [
        Self::RiskAgent,
        Self::CommunicationAgent,
        Self::ReceiptProcessingAgent,
    ];

    /// Deployed function name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RiskAgent => "risk-agent",
            Self::CommunicationAgent => "communication-agent",
            Self::ReceiptProcessingAgent => "receipt-processing-agent",
        }
    }

    /// Entry module name, also the entry file stem.
    pub fn module(self) -> &'static str {
        match self {
            Self::RiskAgent => "risk_agent",
            Self::CommunicationAgent => "communication_agent",
            Self::ReceiptProcessingAgent => "receipt_processing_agent",
        }
    }

    /// Entry file name inside the source directory.
    pub fn entry_file(self) -> String {
        format!("{}.py", self.module())
    }

    /// Handler entry point.
    pub fn handler(self) -> String {
        format!("{}.{}", self.module(), HANDLER_FUNCTION)
    }

    /// Environment variables this function reads.
    pub fn environment(self, config: &DeployConfig) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("USE_BEDROCK".to_string(), config.use_bedrock.to_string());
        match self {
            Self::RiskAgent => {}
            Self::CommunicationAgent => {
                env.insert("VERIFIED_EMAIL".to_string(), config.verified_email.clone());
                env.insert("COMPANY_NAME".to_string(), config.company_name.clone());
            }
            Self::ReceiptProcessingAgent => {
                env.insert("S3_BUCKET".to_string(), config.receipt_bucket.clone());
                env.insert("USE_TEXTRACT".to_string(), config.use_textract.to_string());
            }
        }
        env
    }

    /// Desired spec of this function under `config`.
    pub fn spec(self, config: &DeployConfig) -> FunctionSpec {
        let sizing = config.sizing(self);
        FunctionSpec {
            name: self.name().to_string(),
            runtime: config.runtime.clone(),
            handler: self.handler(),
            timeout_secs: sizing.timeout_secs,
            memory_mb: sizing.memory_mb,
            environment: self.environment(config),
        }
    }
}

impl fmt::Display for ProcessingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name that matches no processing function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown function {0:?}; expected one of: risk-agent, communication-agent, receipt-processing-agent, all")]
pub struct UnknownFunction(pub String);

impl FromStr for ProcessingFunction {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownFunction(s.to_string()))
    }
}

/// What a deployment run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployTarget {
    /// Topology plus every function.
    #[default]
    All,
    /// One function only; the topology is left alone.
    Function(ProcessingFunction),
}

impl DeployTarget {
    /// Functions this target deploys.
    pub fn functions(self) -> Vec<ProcessingFunction> {
        match self {
            Self::All => ProcessingFunction::ALL.to_vec(),
            Self::Function(f) => vec![f],
        }
    }

    /// Whether the run reconciles the routing topology.
    pub fn includes_topology(self) -> bool {
        matches!(self, Self::All)
    }
}

impl FromStr for DeployTarget {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Self::All);
        }
        s.parse().map(Self::Function)
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Function(func) => fmt::Display::fmt(func, f),
        }
    }
}
