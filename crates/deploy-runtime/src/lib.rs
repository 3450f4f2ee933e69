//! # Billing Deploy Runtime
//!
//! Command-line entry point for converging the billing event pipeline.
//!
//! ## Run Sequence
//!
//! 1. Parse arguments; flags override `DeployConfig::from_env()`
//! 2. Validate configuration (usage errors exit before any remote call)
//! 3. Install logging and metrics
//! 4. Reconcile routing (bus → rules)
//! 5. Deploy functions, one failure does not stop the others
//! 6. Reconcile bindings (targets → grants)
//! 7. Print one status line per resource and function
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Every resource and function converged |
//! | 1 | Usage or configuration error, nothing was attempted |
//! | 2 | At least one resource or function failed |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cli;
pub mod runner;

pub use cli::{Args, Invocation, Mode, UsageError};
pub use runner::{execute, record_metrics};

/// Everything converged.
pub const EXIT_SUCCESS: u8 = 0;

/// Bad argument or configuration.
pub const EXIT_USAGE: u8 = 1;

/// Some resource or function failed.
pub const EXIT_FAILURE: u8 = 2;

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
