//! # Billing Bus - Runtime Event Routing Contract
//!
//! The matching and delivery semantics the managed platform enforces when an
//! envelope is put on the billing bus, specified precisely enough to test a
//! topology against.
//!
//! ## Routing Rules
//!
//! - An envelope matches a rule iff its `source` is in the rule's source set
//!   AND its `detail-type` is in the rule's detail-type set. Exact strings,
//!   no wildcards.
//! - One envelope may match zero, one or many rules; each match fans out to
//!   every target of that rule independently.
//! - A delivery requires a permission statement scoping the router to that
//!   function on behalf of that rule. Missing grants fail the delivery hard.
//! - Ordering across rules and targets is not guaranteed; delivery is
//!   at-least-once.
//!
//! ## Chained Pipeline
//!
//! ```text
//! billing.invoice.created ──InvoiceCreatedRule──→ risk-agent
//!                                                      │
//!        billing.risk.agent ←─────────────────────────┘
//!               │
//!               └──CommunicationTriggerRule──→ communication-agent
//!
//! billing.receipt.uploaded ──ReceiptProcessingRule──→ receipt-processing-agent
//!                                                      │
//!        billing.payment.received ←───────────────────┘
//!               │
//!               └──PaymentConfirmationRule──→ communication-agent
//! ```
//!
//! ## Features
//!
//! - `metrics` (default): count dispatched envelopes and deliveries by
//!   outcome in the `billing-telemetry` registry.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dedup;
pub mod publisher;
pub mod router;
pub mod routing;

pub use dedup::{DuplicateCache, IdempotentInvoker};
pub use publisher::{BatchReport, EventPublisher};
pub use router::{
    ChainReport, Delivery, DeliveryOutcome, DispatchReport, EventRouter, FunctionInvoker,
    InvocationError, RoutingError,
};
pub use routing::{RouteEntry, RoutingTable};

/// Maximum entries accepted by one batch put.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Default bound on how many times emitted envelopes may re-enter the router.
pub const DEFAULT_MAX_HOPS: usize = 8;
