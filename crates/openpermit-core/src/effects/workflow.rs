//! Workflow collaborator capabilities
//!
//! Submission updates, media intake and the audit trail live outside the
//! bridge. Handles are constructed by the caller and passed in explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Geographic position of a captured photo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

/// Descriptor returned by the media collaborator after an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMedia {
    /// Where the media is stored
    pub stored_path: PathBuf,
    /// Capture location
    pub location: GeoPoint,
    /// Validation and analysis metadata
    pub analysis: Value,
}

/// Media collaborator errors; propagated unmodified to outbound callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Media file does not exist
    #[error("Media file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File content is not a supported image format
    #[error("Unsupported image format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Media could not be read
    #[error("Media I/O error: {0}")]
    Io(String),
}

/// Accepts geo-tagged inspection media
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Validate and store a photo captured at `lat`/`lon`
    async fn upload_photo(&self, path: &Path, lat: f64, lon: f64)
        -> Result<StoredMedia, MediaError>;
}

/// Submission and audit collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Reading or writing a workflow file failed
    #[error("Workflow I/O error on {path}: {reason}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// Workflow data could not be serialized
    #[error("Workflow serialization error: {0}")]
    Serialization(String),

    /// A submission path escapes the store's root directory
    #[error("Submission path {path} is outside {root}")]
    OutsideRoot {
        /// Path as requested
        path: PathBuf,
        /// Directory submissions are confined to
        root: PathBuf,
    },
}

impl WorkflowError {
    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// New state written into a submission file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionUpdate {
    /// Workflow status, e.g. `received` or `approved`
    pub status: String,
    /// Event payload that triggered the update
    pub data: Value,
}

/// Updates submission records from inbound events
pub trait SubmissionUpdater: Send + Sync {
    /// Overwrite the submission at `path` and audit the change as `actor`
    fn update_submission(
        &self,
        path: &Path,
        update: &SubmissionUpdate,
        actor: &str,
    ) -> Result<(), WorkflowError>;
}

/// One audit trail record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// File the action touched
    pub file: String,
    /// Acting user
    pub user: String,
    /// Action name, e.g. `create` or `update`
    pub action: String,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit record sink
pub trait AuditSink: Send + Sync {
    /// Append an entry
    fn record(&self, entry: AuditEntry) -> Result<(), WorkflowError>;
}
