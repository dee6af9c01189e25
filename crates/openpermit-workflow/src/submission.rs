//! Submission files with an audit trail

use openpermit_core::effects::{SubmissionUpdate, SubmissionUpdater, WorkflowError};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::AuditTrail;

/// Writes submission documents under one root directory and audits every
/// write
///
/// Paths already under the root are used as given and other relative paths
/// resolve under it. A path with a `..` component, or an absolute path
/// elsewhere, is refused with [`WorkflowError::OutsideRoot`] before anything
/// is written. The check is lexical; symlinks inside the root are followed.
///
/// The audit trail is passed in by the caller; there is no shared default.
#[derive(Debug, Clone)]
pub struct SubmissionStore {
    root: PathBuf,
    trail: Arc<AuditTrail>,
}

impl SubmissionStore {
    /// Store confined to `root`, auditing into `trail`
    pub fn new(root: impl Into<PathBuf>, trail: Arc<AuditTrail>) -> Self {
        Self {
            root: root.into(),
            trail,
        }
    }

    /// Directory submissions are confined to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Audit trail this store writes to
    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Create a submission file and audit it as `create`
    pub fn create_submission<T: Serialize>(
        &self,
        path: &Path,
        data: &T,
        user: &str,
    ) -> Result<(), WorkflowError> {
        let path = self.confine(path)?;
        write_json(&path, data)?;
        self.trail.record_action(&path, user, "create")?;
        info!(path = %path.display(), user, "Created submission");
        Ok(())
    }

    /// Overwrite a submission file and audit it as `update`
    pub fn write_update<T: Serialize>(
        &self,
        path: &Path,
        data: &T,
        user: &str,
    ) -> Result<(), WorkflowError> {
        let path = self.confine(path)?;
        write_json(&path, data)?;
        self.trail.record_action(&path, user, "update")?;
        info!(path = %path.display(), user, "Updated submission");
        Ok(())
    }

    fn confine(&self, path: &Path) -> Result<PathBuf, WorkflowError> {
        let climbs = path.components().any(|c| matches!(c, Component::ParentDir));
        let resolved = if path.starts_with(&self.root) || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if climbs || !resolved.starts_with(&self.root) {
            warn!(path = %path.display(), root = %self.root.display(), "Refusing submission path outside the store root");
            return Err(WorkflowError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(resolved)
    }
}

impl SubmissionUpdater for SubmissionStore {
    fn update_submission(
        &self,
        path: &Path,
        update: &SubmissionUpdate,
        actor: &str,
    ) -> Result<(), WorkflowError> {
        self.write_update(path, update, actor)
    }
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), WorkflowError> {
    let body =
        serde_json::to_string_pretty(data).map_err(|e| WorkflowError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
    }
    std::fs::write(path, body).map_err(|e| WorkflowError::io(path, e))
}
