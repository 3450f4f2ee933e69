//! Cross-crate integration scenarios.

pub mod file_plane;
pub mod idempotence;
pub mod pipeline;
pub mod routing;
