//! # Domain Module
//!
//! Desired topology, deployment configuration, function catalog and the
//! reports produced by a run.

pub mod config;
pub mod descriptor;
pub mod errors;
pub mod functions;
pub mod report;

pub use config::*;
pub use descriptor::*;
pub use errors::*;
pub use functions::*;
pub use report::*;
