//! # Adapters Module
//!
//! Control-plane implementations and decorators.

pub mod file_store;
pub mod in_memory;
pub mod retrying;
pub mod state;

pub use file_store::FileControlPlane;
pub use in_memory::{InMemoryControlPlane, Operation};
pub use retrying::RetryingControlPlane;
pub use state::{PlaneSnapshot, StoredResource};
