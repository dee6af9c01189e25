//! # OpenPermit Workflow
//!
//! Concrete workflow collaborators the bridge dispatches into:
//!
//! - [`AuditTrail`]: append-only JSON-lines audit log
//! - [`SubmissionStore`]: submission files, audited through an explicit trail
//! - [`PhotoInspection`]: geo-tagged inspection photo intake

#![forbid(unsafe_code)]

pub mod audit;
pub mod inspection;
pub mod submission;

pub use audit::AuditTrail;
pub use inspection::{ImageFormat, PhotoInspection};
pub use submission::SubmissionStore;
