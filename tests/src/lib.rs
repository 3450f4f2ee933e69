//! # Billing Pipeline Test Suite
//!
//! Cross-crate scenarios: a topology reconciled by `billing-deploy` is
//! exported as a routing table and driven through the `billing-bus` router.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Simulated functions, static bundles, account
//! └── integration/
//!     ├── routing.rs     # Matching contract over the production topology
//!     ├── pipeline.rs    # Reconcile → route, chained dispatch
//!     ├── idempotence.rs # Re-runs, races, partial failure
//!     └── file_plane.rs  # File-backed control plane end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p billing-tests
//! cargo test -p billing-tests integration::pipeline::
//! cargo bench -p billing-tests
//! ```

pub mod fixtures;
pub mod integration;
