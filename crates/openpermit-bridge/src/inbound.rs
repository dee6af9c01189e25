//! Inbound message classification and side-effect planning
//!
//! Raw room messages fall into a closed set of kinds; only permit event
//! documents go on to parsing and validation. A validated event is turned
//! into a list of workflow side effects, which the bridge then executes.

use openpermit_core::effects::{
    MediaError, RawMessage, StoredMedia, SubmissionUpdate,
};
use openpermit_core::{CodecError, EventType, PermitEvent, PermitId, UserId, EVENT_CONTENT_TYPE};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Actor recorded for inbound updates that name none
pub const DEFAULT_INBOUND_ACTOR: &str = "matrix";

const ROOM_MESSAGE: &str = "m.room.message";
const ROOM_MEMBER: &str = "m.room.member";

/// Kinds of raw message the bridge can receive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage<'a> {
    /// Permit event document from another participant
    PermitEvent {
        /// The wire document
        document: &'a Value,
    },
    /// Message the bridge itself sent
    Echo,
    /// Plain chat message
    Chat,
    /// Membership change
    Membership,
    /// Anything else
    Other {
        /// Transport event type
        event_type: &'a str,
    },
}

impl<'a> InboundMessage<'a> {
    /// Classify `raw` as seen by `own_user`
    pub fn classify(raw: &'a RawMessage, own_user: &UserId) -> Self {
        if raw.sender == *own_user {
            return Self::Echo;
        }
        match raw.event_type.as_str() {
            EVENT_CONTENT_TYPE => Self::PermitEvent {
                document: &raw.content,
            },
            ROOM_MESSAGE => Self::Chat,
            ROOM_MEMBER => Self::Membership,
            other => Self::Other { event_type: other },
        }
    }
}

/// Why an inbound permit event was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The document could not be parsed
    Parse(CodecError),
    /// The document failed shape validation
    Rejected {
        /// Validator diagnostics
        diagnostics: String,
    },
}

/// Side effect carried out for an inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    /// Submission file updated
    SubmissionUpdated {
        /// Submission file
        path: PathBuf,
    },
    /// Submission update failed
    SubmissionFailed {
        /// Submission file
        path: PathBuf,
        /// Collaborator error
        error: String,
    },
    /// Inspection photo ingested
    MediaIngested {
        /// Stored media descriptor
        stored: StoredMedia,
    },
    /// Inspection photo could not be ingested
    MediaFailed {
        /// Media file named by the event
        path: PathBuf,
        /// Collaborator error
        error: MediaError,
    },
}

/// Result of handling one raw message
///
/// Inbound handling never fails; every outcome is one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Not a permit event from another participant
    Ignored {
        /// Transport event type of the ignored message
        event_type: String,
    },
    /// Permit event that was parsed or validated unsuccessfully
    Dropped {
        /// Transport event id
        event_id: String,
        /// What went wrong
        reason: DropReason,
    },
    /// Validated permit event whose side effects were attempted
    Dispatched {
        /// Permit the event belongs to
        permit_id: PermitId,
        /// Event kind
        event_type: EventType,
        /// Side effects attempted, in order
        actions: Vec<DispatchAction>,
    },
}

impl InboundOutcome {
    /// Whether this message reached dispatch
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Side effect derived from a validated event, not yet executed
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SideEffect {
    UpdateSubmission {
        path: PathBuf,
        update: SubmissionUpdate,
        actor: String,
    },
    IngestMedia {
        path: PathBuf,
        lat: f64,
        lon: f64,
    },
}

/// Workflow side effects an event calls for
///
/// A submission path plus a status updates the submission. An
/// inspection-media event with a media path and a readable location is
/// ingested as a photo.
pub(crate) fn plan_side_effects(event: &PermitEvent) -> Vec<SideEffect> {
    let mut effects = Vec::new();

    if let (Some(path), Some(status)) = (event.payload_str("submissionPath"), event.status()) {
        effects.push(SideEffect::UpdateSubmission {
            path: PathBuf::from(path),
            update: SubmissionUpdate {
                status: status.to_string(),
                data: Value::Object(event.payload().clone()),
            },
            actor: event.actor().unwrap_or(DEFAULT_INBOUND_ACTOR).to_string(),
        });
    }

    if event.event_type() == EventType::InspectionMedia {
        let location = event.payload().get("location").and_then(Value::as_object);
        if let (Some(path), Some((lat, lon))) =
            (event.payload_str("mediaPath"), location.and_then(coordinates))
        {
            effects.push(SideEffect::IngestMedia {
                path: PathBuf::from(path),
                lat,
                lon,
            });
        }
    }

    effects
}

/// `lat`/`lon`, or `latitude`/`longitude`, as numbers or numeric strings
///
/// Coordinates outside the geographic ranges are unreadable.
fn coordinates(location: &Map<String, Value>) -> Option<(f64, f64)> {
    let lat = coordinate(location, "lat", "latitude").filter(|lat| lat.abs() <= 90.0)?;
    let lon = coordinate(location, "lon", "longitude").filter(|lon| lon.abs() <= 180.0)?;
    Some((lat, lon))
}

fn coordinate(location: &Map<String, Value>, short: &str, long: &str) -> Option<f64> {
    let value = location.get(short).or_else(|| location.get(long))?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}
