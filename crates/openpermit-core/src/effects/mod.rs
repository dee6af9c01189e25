//! Capability traits the bridge depends on
//!
//! - [`transport`]: chat rooms, sends and long-poll sync
//! - [`validation`]: shape set loading and document conformance
//! - [`workflow`]: submission updates, media intake, audit trail

pub mod transport;
pub mod validation;
pub mod workflow;

pub use transport::{ChatTransport, RawMessage, RoomVisibility, Session, TransportError};
pub use validation::{
    ConformanceEngine, DocumentValidator, ShapeError, ShapeSource, ValidationOutcome,
};
pub use workflow::{
    AuditEntry, AuditSink, GeoPoint, MediaError, MediaStore, StoredMedia, SubmissionUpdate,
    SubmissionUpdater, WorkflowError,
};
