//! Recording collaborators
//!
//! Stand-ins for the workflow collaborators that remember every call and can
//! be scripted to fail.

use async_trait::async_trait;
use openpermit_core::effects::{
    DocumentValidator, GeoPoint, MediaError, MediaStore, StoredMedia, SubmissionUpdate,
    SubmissionUpdater, ValidationOutcome, WorkflowError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One `update_submission` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpdate {
    pub path: PathBuf,
    pub update: SubmissionUpdate,
    pub actor: String,
}

/// Submission updater that records calls instead of writing files
#[derive(Debug, Default)]
pub struct RecordingSubmissions {
    updates: Mutex<Vec<RecordedUpdate>>,
    fail: AtomicBool,
}

impl RecordingSubmissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail with an I/O error
    pub fn fail_updates(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().len()
    }
}

impl SubmissionUpdater for RecordingSubmissions {
    fn update_submission(
        &self,
        path: &Path,
        update: &SubmissionUpdate,
        actor: &str,
    ) -> Result<(), WorkflowError> {
        self.updates.lock().push(RecordedUpdate {
            path: path.to_path_buf(),
            update: update.clone(),
            actor: actor.to_string(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkflowError::io(path, "disk full"));
        }
        Ok(())
    }
}

/// One `upload_photo` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub path: PathBuf,
    pub lat: f64,
    pub lon: f64,
}

/// Media store that records uploads and replays scripted failures
///
/// Without a scripted result an upload succeeds with a descriptor echoing the
/// request and a fixed analysis.
#[derive(Debug, Default)]
pub struct RecordingMedia {
    uploads: Mutex<Vec<RecordedUpload>>,
    scripted: Mutex<VecDeque<MediaError>>,
}

impl RecordingMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next upload with `error`
    pub fn fail_next(&self, error: MediaError) {
        self.scripted.lock().push_back(error);
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Analysis attached to successful uploads
    pub fn analysis() -> Value {
        json!({ "validation": { "valid": true, "format": "jpeg" }, "ai": null })
    }
}

#[async_trait]
impl MediaStore for RecordingMedia {
    async fn upload_photo(&self, path: &Path, lat: f64, lon: f64) -> Result<StoredMedia, MediaError> {
        self.uploads.lock().push(RecordedUpload {
            path: path.to_path_buf(),
            lat,
            lon,
        });
        if let Some(error) = self.scripted.lock().pop_front() {
            return Err(error);
        }
        Ok(StoredMedia {
            stored_path: path.to_path_buf(),
            location: GeoPoint { lat, lon },
            analysis: Self::analysis(),
        })
    }
}

/// Validator with a fixed verdict that counts its calls
#[derive(Debug)]
pub struct StaticValidator {
    outcome: ValidationOutcome,
    calls: AtomicUsize,
}

impl StaticValidator {
    /// Accepts every document
    pub fn accepting() -> Self {
        Self {
            outcome: ValidationOutcome::conforming(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Rejects every document with `diagnostics`
    pub fn rejecting(diagnostics: &str) -> Self {
        Self {
            outcome: ValidationOutcome::violation(diagnostics),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentValidator for StaticValidator {
    fn validate(&self, _document: &Value) -> ValidationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
