//! # Error Types
//!
//! Errors that abort an operation. Per-resource failures during
//! reconciliation are not errors; they are recorded in the report.

use billing_types::ControlPlaneError;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required value missing or empty.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// Value present but outside its allowed range.
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Topology descriptor errors. Any of these aborts the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor document could not be parsed.
    #[error("descriptor parse error: {0}")]
    Parse(String),

    /// The descriptor could not be rendered as a document.
    #[error("descriptor render error: {0}")]
    Render(String),

    /// Dependency edges name a missing resource or form a cycle.
    #[error("invalid resource graph: {0}")]
    InvalidGraph(String),

    /// Two rules share a name on the same bus.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// Two targets of one rule share an id.
    #[error("duplicate target {target_id} on rule {rule}")]
    DuplicateTarget {
        /// Rule name.
        rule: String,
        /// Target id.
        target_id: String,
    },

    /// Two grants on one function share a statement id.
    #[error("duplicate statement {statement_id} on function {function}")]
    DuplicateStatement {
        /// Function name.
        function: String,
        /// Statement id.
        statement_id: String,
    },

    /// A rule pattern with an empty source or detail-type set.
    #[error("rule {0} has an empty pattern")]
    EmptyPattern(String),

    /// A rule or target that does not belong to the descriptor's bus.
    #[error("{0} is not on the descriptor bus")]
    BusMismatch(String),

    /// A target that belongs to a different rule than the binding it is in.
    #[error("target {target_id} is bound under rule {rule} but names rule {named}")]
    MisplacedTarget {
        /// Enclosing rule.
        rule: String,
        /// Target id.
        target_id: String,
        /// Rule the target names.
        named: String,
    },

    /// A grant that does not authorize one of its rule's targets.
    #[error("grant {statement_id} on {function} does not authorize a target of rule {rule}")]
    DanglingPermission {
        /// Enclosing rule.
        rule: String,
        /// Function name.
        function: String,
        /// Statement id.
        statement_id: String,
    },

    /// A target without a grant authorizing its rule.
    #[error("target {target_id} of rule {rule} has no invocation grant")]
    UngrantedTarget {
        /// Rule name.
        rule: String,
        /// Target id.
        target_id: String,
    },
}

/// Code bundle assembly errors.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Filesystem failure while collecting files.
    #[error("bundle I/O error at {path}: {source}")]
    Io {
        /// Path being read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Archive path that is absolute or escapes the bundle root.
    #[error("invalid archive path: {0}")]
    InvalidPath(String),

    /// The same archive path added twice.
    #[error("duplicate archive path: {0}")]
    DuplicatePath(String),

    /// Bundle without an entry file.
    #[error("bundle has no entry file")]
    MissingEntry,

    /// Archive encoding failure.
    #[error("bundle encoding failed: {0}")]
    Encoding(String),
}

/// Function deployment errors, one variant per lifecycle step.
///
/// The step tells the operator how far the update got: a failed code
/// update leaves the previous code active, a failed configuration update
/// leaves the new code with the old configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// The function spec itself is invalid; nothing was sent.
    #[error("invalid function spec: {0}")]
    InvalidSpec(String),

    /// Describe failed with a non-absence error.
    #[error("describe of {function} failed: {source}")]
    Describe {
        /// Function name.
        function: String,
        /// Remote error.
        source: ControlPlaneError,
    },

    /// Create failed.
    #[error("create of {function} failed: {source}")]
    Create {
        /// Function name.
        function: String,
        /// Remote error.
        source: ControlPlaneError,
    },

    /// Code update failed; the previous code is still active.
    #[error("code update of {function} failed: {source}")]
    CodeUpdate {
        /// Function name.
        function: String,
        /// Remote error.
        source: ControlPlaneError,
    },

    /// Timeout/memory update failed; the new code is active.
    #[error("configuration update of {function} failed: {source}")]
    ConfigurationUpdate {
        /// Function name.
        function: String,
        /// Remote error.
        source: ControlPlaneError,
    },

    /// Environment update failed; code, timeout and memory are current.
    #[error("environment update of {function} failed: {source}")]
    EnvironmentUpdate {
        /// Function name.
        function: String,
        /// Remote error.
        source: ControlPlaneError,
    },
}

impl DeployError {
    /// Underlying remote error, if any.
    pub fn remote(&self) -> Option<&ControlPlaneError> {
        match self {
            Self::InvalidSpec(_) => None,
            Self::Describe { source, .. }
            | Self::Create { source, .. }
            | Self::CodeUpdate { source, .. }
            | Self::ConfigurationUpdate { source, .. }
            | Self::EnvironmentUpdate { source, .. } => Some(source),
        }
    }
}
