//! Shape conformance capability
//!
//! A conformance engine loads a shape set once and checks documents against
//! it. The bridge only sees [`DocumentValidator`]; the engine behind it is
//! swappable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Result of checking one document against a shape set
///
/// A non-conforming outcome always carries non-empty diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the document satisfies every shape
    pub conforms: bool,
    /// Human-readable violation report, empty when conforming
    pub diagnostics: String,
}

impl ValidationOutcome {
    /// A conforming outcome
    pub fn conforming() -> Self {
        Self {
            conforms: true,
            diagnostics: String::new(),
        }
    }

    /// A non-conforming outcome; empty diagnostics are replaced with a generic line
    pub fn violation(diagnostics: impl Into<String>) -> Self {
        let diagnostics = diagnostics.into();
        let diagnostics = if diagnostics.trim().is_empty() {
            "document does not conform to the shape set".to_string()
        } else {
            diagnostics
        };
        Self {
            conforms: false,
            diagnostics,
        }
    }
}

/// Where a shape set comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeSource {
    /// Shape set file on disk
    File(PathBuf),
    /// Shape set given as an in-memory document
    Inline(Value),
    /// Shape set shipped with the engine
    Bundled,
}

/// Shape set loading errors
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// Shape set file could not be read
    #[error("Failed to read shape set {path}: {reason}")]
    Unreadable {
        /// Location that was read
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// Shape set is not a valid shape document
    #[error("Invalid shape set: {0}")]
    Invalid(String),
}

/// A conformance engine over some shape language
pub trait ConformanceEngine: Send + Sync {
    /// Compiled, immutable shape set
    type ShapeSet: Send + Sync;

    /// Load and compile a shape set
    fn load(&self, source: &ShapeSource) -> Result<Self::ShapeSet, ShapeError>;

    /// Check a document; deterministic for a fixed document and shape set
    fn check(&self, document: &Value, shapes: &Self::ShapeSet) -> ValidationOutcome;
}

/// Validator bound to one loaded shape set
pub trait DocumentValidator: Send + Sync {
    /// Check a document against the bound shape set
    fn validate(&self, document: &Value) -> ValidationOutcome;
}
