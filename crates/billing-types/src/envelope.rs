//! # `EventEnvelope`
//!
//! A single routed message. The wire shape is fixed:
//!
//! ```text
//! {"source": string, "detail-type": string, "detail": <opaque JSON>, "bus": string}
//! ```
//!
//! Envelopes are immutable once emitted. Delivery is at-least-once, so the
//! same envelope may reach a function more than once; `logical_id()` gives
//! consumers a stable identity to deduplicate on.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single routed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Emitting source, e.g. `billing.invoice.created`.
    pub source: String,
    /// Human-readable event type, e.g. `New Invoice Generated`.
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    /// Opaque payload. The router never inspects it.
    pub detail: serde_json::Value,
    /// Bus the envelope was put on.
    pub bus: String,
}

impl EventEnvelope {
    /// Create a new envelope.
    pub fn new(
        source: impl Into<String>,
        detail_type: impl Into<String>,
        detail: serde_json::Value,
        bus: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            detail_type: detail_type.into(),
            detail,
            bus: bus.into(),
        }
    }

    /// Stable identity of the envelope's logical content.
    ///
    /// Hex SHA-256 over source, detail type and the detail serialized with
    /// sorted object keys. Two deliveries of the same envelope share it.
    pub fn logical_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.detail_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.detail.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
