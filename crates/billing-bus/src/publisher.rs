//! # Event Publisher
//!
//! The put side of the bus: what a function (or the HTTP layer) calls to
//! emit envelopes.

use async_trait::async_trait;
use billing_types::EventEnvelope;
use tracing::{debug, warn};

use crate::router::{DispatchReport, EventRouter, FunctionInvoker, RoutingError};
use crate::MAX_BATCH_ENTRIES;

/// Summary of a batch put.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Envelopes submitted.
    pub total: usize,
    /// Envelopes accepted by the bus.
    pub accepted: usize,
    /// Envelopes rejected, with the reason.
    pub rejected: Vec<(EventEnvelope, String)>,
    /// Number of put requests issued.
    pub requests: usize,
    /// Dispatch reports of the accepted envelopes.
    pub dispatches: Vec<DispatchReport>,
}

/// Trait for putting envelopes on the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Put a single envelope.
    async fn publish(&self, envelope: EventEnvelope) -> Result<DispatchReport, RoutingError>;

    /// Put many envelopes, at most `MAX_BATCH_ENTRIES` per request.
    ///
    /// Entries are independent: a rejected entry does not fail the batch.
    async fn publish_batch(&self, envelopes: Vec<EventEnvelope>) -> BatchReport {
        let mut report = BatchReport {
            total: envelopes.len(),
            ..Default::default()
        };

        for chunk in envelopes.chunks(MAX_BATCH_ENTRIES) {
            report.requests += 1;
            for envelope in chunk {
                match self.publish(envelope.clone()).await {
                    Ok(dispatch) => {
                        report.accepted += 1;
                        report.dispatches.push(dispatch);
                    }
                    Err(e) => {
                        warn!(source = %envelope.source, error = %e, "Batch entry rejected");
                        report.rejected.push((envelope.clone(), e.to_string()));
                    }
                }
            }
        }

        debug!(
            total = report.total,
            accepted = report.accepted,
            requests = report.requests,
            "Batch published"
        );
        report
    }
}

#[async_trait]
impl<I: FunctionInvoker + 'static> EventPublisher for EventRouter<I> {
    async fn publish(&self, envelope: EventEnvelope) -> Result<DispatchReport, RoutingError> {
        self.dispatch(&envelope).await
    }
}
