//! # Billing Types Crate
//!
//! Domain vocabulary shared by the reconciler, the function lifecycle
//! manager and the runtime event router.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every type that crosses a crate boundary
//!   is defined here.
//! - **Wire Stability**: `EventEnvelope` serializes to exactly
//!   `{source, detail-type, detail, bus}`; downstream functions depend on it.
//! - **Central Error Classification**: `ControlPlaneError::class()` decides
//!   once whether a remote failure is benign, expected, fatal or retryable.

pub mod arn;
pub mod entities;
pub mod envelope;
pub mod errors;

pub use arn::AccountContext;
pub use entities::*;
pub use envelope::EventEnvelope;
pub use errors::*;

/// Principal the event router presents when invoking a function.
pub const EVENTS_PRINCIPAL: &str = "events.amazonaws.com";

/// Action granted by an invocation permission.
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";
