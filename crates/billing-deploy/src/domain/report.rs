//! # Run Reports
//!
//! What a reconciliation or a deploy did, resource by resource.

use std::fmt;

use billing_types::{ResourceKind, ResourceName};
use serde::Serialize;

/// Outcome of converging one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum Outcome {
    /// The resource did not exist and was created.
    Created,
    /// The resource existed with drifted fields and was updated.
    Updated,
    /// The resource already matched, or the remote reported it already exists.
    Unchanged,
    /// The resource could not be converged.
    Failed(String),
}

impl Outcome {
    /// Whether this is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed(_) => "failed",
        }
    }
}

/// Report line for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Natural key.
    pub name: ResourceName,
    /// What happened.
    pub outcome: Outcome,
}

impl fmt::Display for ResourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match &self.outcome {
            Outcome::Failed(_) => "✗",
            _ => "✓",
        };
        write!(
            f,
            "{} {:<10} {:<10} {}",
            marker,
            self.kind.to_string(),
            self.outcome.label(),
            self.name
        )?;
        if let Outcome::Failed(reason) = &self.outcome {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Ordered result of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Entries in plan order.
    pub entries: Vec<ResourceReport>,
}

impl ReconciliationReport {
    /// Append an entry.
    pub fn push(&mut self, kind: ResourceKind, name: ResourceName, outcome: Outcome) {
        self.entries.push(ResourceReport {
            kind,
            name,
            outcome,
        });
    }

    /// Append all entries of another report.
    pub fn extend(&mut self, other: ReconciliationReport) {
        self.entries.extend(other.entries);
    }

    /// Whether no resource failed.
    pub fn is_success(&self) -> bool {
        !self.entries.iter().any(|e| e.outcome.is_failed())
    }

    /// Whether every resource was already in the desired state.
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.outcome == Outcome::Unchanged)
    }

    /// Failed entries.
    pub fn failures(&self) -> impl Iterator<Item = &ResourceReport> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// Number of entries with the given outcome label.
    pub fn count(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.label() == label)
            .count()
    }

    /// Outcome of a resource, if it was part of the run.
    pub fn outcome_of(&self, kind: ResourceKind, name: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.name.as_str() == name)
            .map(|e| &e.outcome)
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed",
            self.count("created"),
            self.count("updated"),
            self.count("unchanged"),
            self.count("failed")
        )
    }
}

/// Whether a deploy created the function or updated it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployAction {
    /// Function was absent and was created.
    Created,
    /// Function existed; code and configuration were replaced.
    Updated,
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
        })
    }
}

/// Result of a successful function deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    /// Function name.
    pub function_name: String,
    /// Create or update.
    pub action: DeployAction,
    /// Hex SHA-256 of the deployed bundle.
    pub code_sha256: String,
    /// Bundle size in bytes.
    pub code_size: usize,
}

impl fmt::Display for DeployResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "✓ function   {:<10} {} (sha256 {}, {} bytes)",
            self.action.to_string(),
            self.function_name,
            &self.code_sha256[..self.code_sha256.len().min(12)],
            self.code_size
        )
    }
}
