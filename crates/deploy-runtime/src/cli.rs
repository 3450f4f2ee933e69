//! # Command Line
//!
//! Argument parsing and the merge of flags over the environment.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use billing_deploy::{ConfigError, DeployConfig, DeployTarget, DescriptorError, TopologyDescriptor};
use billing_types::AccountContext;
use clap::{CommandFactory, Parser};
use thiserror::Error;

/// Deploy the billing event pipeline.
#[derive(Parser, Debug, Clone)]
#[command(name = "deploy-runtime")]
#[command(about = "Converge the billing event bus, its rules and the processing functions")]
#[command(version)]
pub struct Args {
    /// Function to deploy (risk-agent, communication-agent,
    /// receipt-processing-agent) or `all`
    #[arg(default_value = "all")]
    pub target: String,

    /// Print the ordered plan without calling the control plane
    #[arg(long)]
    pub dry_run: bool,

    /// Print the topology document and exit
    #[arg(long, conflicts_with = "dry_run")]
    pub print_topology: bool,

    /// Topology document to deploy instead of the built-in one
    #[arg(long, value_name = "FILE")]
    pub topology: Option<PathBuf>,

    /// Local control-plane state file
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Directory holding the function entry files
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// Directory bundled alongside every entry file
    #[arg(long, value_name = "DIR")]
    pub deps_dir: Option<PathBuf>,

    /// Deployment region
    #[arg(long, value_name = "R")]
    pub region: Option<String>,

    /// Twelve-digit account id
    #[arg(long, value_name = "ID")]
    pub account_id: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub call_timeout: Option<u64>,

    /// Reconcile independent rule trees concurrently
    #[arg(long)]
    pub concurrent: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub print_metrics: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Errors that abort a run before any remote call.
#[derive(Debug, Error)]
pub enum UsageError {
    /// Positional argument names no function.
    #[error("unknown target '{0}': expected all, risk-agent, communication-agent or receipt-processing-agent")]
    UnknownTarget(String),

    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Topology document unreadable.
    #[error("cannot read topology {path}: {source}")]
    TopologyIo {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Topology document invalid.
    #[error("invalid topology: {0}")]
    Topology(#[from] DescriptorError),
}

/// What the run does once configuration is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Converge the control plane.
    Deploy,
    /// List the plan only.
    DryRun,
    /// Print the topology document only.
    PrintTopology,
}

/// A fully resolved command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// What to deploy.
    pub target: DeployTarget,
    /// Merged configuration.
    pub config: DeployConfig,
    /// Topology to converge.
    pub descriptor: TopologyDescriptor,
    /// What to do.
    pub mode: Mode,
    /// Concurrent rule trees.
    pub concurrent: bool,
    /// Dump metrics after the run.
    pub print_metrics: bool,
}

impl Args {
    /// Merge flags over `base` and validate the result.
    pub fn resolve(&self, base: DeployConfig) -> Result<Invocation, UsageError> {
        let target: DeployTarget = self
            .target
            .parse()
            .map_err(|_| UsageError::UnknownTarget(self.target.clone()))?;

        let config = self.apply(base);
        config.validate()?;

        let descriptor = match &self.topology {
            Some(path) => {
                let document = fs::read_to_string(path).map_err(|source| UsageError::TopologyIo {
                    path: path.clone(),
                    source,
                })?;
                TopologyDescriptor::from_json(&document)?
            }
            None => TopologyDescriptor::billing_default(&config),
        };

        let mode = if self.print_topology {
            Mode::PrintTopology
        } else if self.dry_run {
            Mode::DryRun
        } else {
            Mode::Deploy
        };

        Ok(Invocation {
            target,
            config,
            descriptor,
            mode,
            concurrent: self.concurrent,
            print_metrics: self.print_metrics,
        })
    }

    fn apply(&self, mut config: DeployConfig) -> DeployConfig {
        if self.region.is_some() || self.account_id.is_some() {
            let region = self
                .region
                .clone()
                .unwrap_or_else(|| config.account.region.clone());
            let account_id = self
                .account_id
                .clone()
                .unwrap_or_else(|| config.account.account_id.clone());
            config.account = AccountContext::new(region, account_id);
        }
        if let Some(path) = &self.state_file {
            config.state_file = path.clone();
        }
        if let Some(dir) = &self.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &self.deps_dir {
            config.deps_dir = Some(dir.clone());
        }
        if let Some(secs) = self.call_timeout {
            config.call_timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// One-line usage for error output.
pub fn usage() -> String {
    Args::command().render_usage().to_string()
}
