//! # Algorithms Module
//!
//! Pure logic: plan ordering and bundle assembly.

pub mod bundle;
pub mod plan;

pub use bundle::*;
pub use plan::*;
