//! Deployment configuration from environment variables.
//!
//! Loaded once at startup and validated before any remote call is made.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use billing_types::AccountContext;

use super::errors::ConfigError;
use super::functions::ProcessingFunction;

/// Smallest memory size the platform accepts, in MB.
pub const MIN_MEMORY_MB: u32 = 128;

/// Largest memory size the platform accepts, in MB.
pub const MAX_MEMORY_MB: u32 = 10_240;

/// Largest function timeout the platform accepts, in seconds.
pub const MAX_TIMEOUT_SECS: u32 = 900;

/// Backoff schedule for retryable control-plane errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Timeout and memory of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSizing {
    /// Timeout in seconds.
    pub timeout_secs: u32,
    /// Memory in MB.
    pub memory_mb: u32,
}

/// Everything a deployment run needs to know about its environment.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Region and account the ARNs are built from.
    pub account: AccountContext,
    /// Shared bus name.
    pub bus_name: String,
    /// Execution role assumed by every function.
    pub role_name: String,
    /// Function runtime identifier.
    pub runtime: String,
    /// Bound on every individual control-plane call.
    pub call_timeout: Duration,
    /// Retry schedule for retryable errors.
    pub retry: RetryPolicy,
    /// Sender address for outbound mail.
    pub verified_email: String,
    /// Company name used in customer communication.
    pub company_name: String,
    /// Bucket receipts are uploaded to.
    pub receipt_bucket: String,
    /// Whether functions use the hosted language model.
    pub use_bedrock: bool,
    /// Whether the receipt function uses hosted OCR.
    pub use_textract: bool,
    /// Sizing of the risk function.
    pub risk_agent: FunctionSizing,
    /// Sizing of the communication function.
    pub communication_agent: FunctionSizing,
    /// Sizing of the receipt function.
    pub receipt_agent: FunctionSizing,
    /// Directory holding `<module>.py` entry files.
    pub source_dir: PathBuf,
    /// Optional directory of third-party packages added to every bundle.
    pub deps_dir: Option<PathBuf>,
    /// Local state file of the file-backed control plane.
    pub state_file: PathBuf,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            account: AccountContext::new("ap-southeast-1", "000000000000"),
            bus_name: "billing-events".to_string(),
            role_name: "billing-lambda-role".to_string(),
            runtime: "python3.11".to_string(),
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            verified_email: "billing@example.com".to_string(),
            company_name: "Billing Co".to_string(),
            receipt_bucket: "billing-receipts".to_string(),
            use_bedrock: false,
            use_textract: false,
            risk_agent: FunctionSizing {
                timeout_secs: 60,
                memory_mb: 512,
            },
            communication_agent: FunctionSizing {
                timeout_secs: 60,
                memory_mb: 256,
            },
            receipt_agent: FunctionSizing {
                timeout_secs: 120,
                memory_mb: 512,
            },
            source_dir: PathBuf::from("lambda_functions"),
            deps_dir: None,
            state_file: PathBuf::from(".billing-state.json"),
        }
    }
}

impl DeployConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BILLING_REGION`: Region (default: ap-southeast-1)
    /// - `BILLING_ACCOUNT_ID`: Account id (default: 000000000000)
    /// - `BILLING_EVENT_BUS`: Bus name (default: billing-events)
    /// - `BILLING_ROLE_NAME`: Execution role (default: billing-lambda-role)
    /// - `BILLING_RUNTIME`: Function runtime (default: python3.11)
    /// - `BILLING_CALL_TIMEOUT_SECS`: Per-call timeout (default: 30)
    /// - `BILLING_RETRY_ATTEMPTS`: Attempts per call (default: 3)
    /// - `BILLING_SOURCE_DIR`: Entry file directory (default: lambda_functions)
    /// - `BILLING_DEPS_DIR`: Dependency directory (default: none)
    /// - `BILLING_STATE_FILE`: Local state file (default: .billing-state.json)
    /// - `VERIFIED_EMAIL`, `COMPANY_NAME`, `S3_BUCKET`: Function settings
    /// - `USE_BEDROCK`, `USE_TEXTRACT`: Feature switches (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false)
        };

        let region = text("BILLING_REGION", &defaults.account.region);
        let account_id = text("BILLING_ACCOUNT_ID", &defaults.account.account_id);

        Self {
            account: AccountContext::new(region, account_id),
            bus_name: text("BILLING_EVENT_BUS", &defaults.bus_name),
            role_name: text("BILLING_ROLE_NAME", &defaults.role_name),
            runtime: text("BILLING_RUNTIME", &defaults.runtime),
            call_timeout: lookup("BILLING_CALL_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            retry: RetryPolicy {
                max_attempts: lookup("BILLING_RETRY_ATTEMPTS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            verified_email: text("VERIFIED_EMAIL", &defaults.verified_email),
            company_name: text("COMPANY_NAME", &defaults.company_name),
            receipt_bucket: text("S3_BUCKET", &defaults.receipt_bucket),
            use_bedrock: flag("USE_BEDROCK"),
            use_textract: flag("USE_TEXTRACT"),
            source_dir: lookup("BILLING_SOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_dir),
            deps_dir: lookup("BILLING_DEPS_DIR").map(PathBuf::from),
            state_file: lookup("BILLING_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            ..defaults
        }
    }

    /// Reject settings the control plane would refuse anyway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.region.trim().is_empty() {
            return Err(ConfigError::Missing("BILLING_REGION"));
        }
        if self.account.account_id.len() != 12
            || !self.account.account_id.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid {
                name: "BILLING_ACCOUNT_ID",
                reason: format!("expected 12 digits, got {:?}", self.account.account_id),
            });
        }
        if self.bus_name.trim().is_empty() {
            return Err(ConfigError::Missing("BILLING_EVENT_BUS"));
        }
        if self.role_name.trim().is_empty() {
            return Err(ConfigError::Missing("BILLING_ROLE_NAME"));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "BILLING_CALL_TIMEOUT_SECS",
                reason: "must be positive".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "BILLING_RETRY_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        for function in ProcessingFunction::ALL {
            validate_sizing(function.name(), self.sizing(function))?;
        }
        Ok(())
    }

    /// Sizing of one processing function.
    pub fn sizing(&self, function: ProcessingFunction) -> FunctionSizing {
        match function {
            ProcessingFunction::RiskAgent => self.risk_agent,
            ProcessingFunction::CommunicationAgent => self.communication_agent,
            ProcessingFunction::ReceiptProcessingAgent => self.receipt_agent,
        }
    }

    /// ARN of the execution role.
    pub fn role_arn(&self) -> String {
        self.account.role_arn(&self.role_name)
    }
}

/// Check timeout and memory against platform limits.
pub fn validate_sizing(function: &str, sizing: FunctionSizing) -> Result<(), ConfigError> {
    if sizing.timeout_secs == 0 || sizing.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Invalid {
            name: "timeout",
            reason: format!(
                "{function}: {}s outside 1..={MAX_TIMEOUT_SECS}",
                sizing.timeout_secs
            ),
        });
    }
    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&sizing.memory_mb) {
        return Err(ConfigError::Invalid {
            name: "memory",
            reason: format!(
                "{function}: {} MB outside {MIN_MEMORY_MB}..={MAX_MEMORY_MB}",
                sizing.memory_mb
            ),
        });
    }
    Ok(())
}
