//! Permit event model

use crate::errors::CodecError;
use crate::identifiers::PermitId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Base IRI of the permit ontology
pub const ONTOLOGY_IRI: &str = "https://openpermit.io/ontology";

/// Opaque key/value event payload
pub type Payload = Map<String, Value>;

/// Closed set of permit event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A permit application was submitted
    Submission,
    /// The workflow status of a permit changed
    StatusUpdate,
    /// A permit was approved
    Approval,
    /// An inspection was scheduled
    Inspection,
    /// Geo-tagged media was attached to an inspection
    InspectionMedia,
}

impl EventType {
    /// Every known event kind
    pub const ALL: [EventType; 5] = [
        EventType::Submission,
        EventType::StatusUpdate,
        EventType::Approval,
        EventType::Inspection,
        EventType::InspectionMedia,
    ];

    /// Short key used by workflow callers and in the `eventType` field
    pub fn key(self) -> &'static str {
        match self {
            EventType::Submission => "submission",
            EventType::StatusUpdate => "status-update",
            EventType::Approval => "approval",
            EventType::Inspection => "inspection",
            EventType::InspectionMedia => "inspection-media",
        }
    }

    /// Ontology class name
    pub fn type_name(self) -> &'static str {
        match self {
            EventType::Submission => "PermitSubmission",
            EventType::StatusUpdate => "PermitStatus",
            EventType::Approval => "PermitApproval",
            EventType::Inspection => "InspectionScheduled",
            EventType::InspectionMedia => "InspectionMedia",
        }
    }

    /// Full ontology IRI carried in `@type`
    pub fn iri(self) -> String {
        format!("{ONTOLOGY_IRI}#{}", self.type_name())
    }

    /// Resolve an inbound discriminator: IRI, bare class name or short key
    pub fn from_discriminator(value: &str) -> Option<Self> {
        let local = value
            .strip_prefix(ONTOLOGY_IRI)
            .and_then(|rest| rest.strip_prefix('#'))
            .unwrap_or(value);
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == local || kind.key() == local)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EventType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| CodecError::UnsupportedEventType(s.to_string()))
    }
}

/// Canonical permit event
///
/// Only the codec constructs these; they are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PermitEvent {
    pub(crate) event_type: EventType,
    pub(crate) permit_id: PermitId,
    pub(crate) occurred_at: DateTime<Utc>,
    pub(crate) payload: Payload,
    pub(crate) status: Option<String>,
    pub(crate) actor: Option<String>,
    pub(crate) thread_root: Option<String>,
}

impl PermitEvent {
    /// Event kind
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Permit the event belongs to
    pub fn permit_id(&self) -> &PermitId {
        &self.permit_id
    }

    /// Wall-clock time the event was built (outbound) or stamped (inbound)
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Event payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Workflow status, if any
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Acting user, if any
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Event this one continues, if any
    pub fn thread_root(&self) -> Option<&str> {
        self.thread_root.as_deref()
    }

    /// Look up a string field in the payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_resolve_in_every_form() {
        for kind in EventType::ALL {
            assert_eq!(EventType::from_discriminator(&kind.iri()), Some(kind));
            assert_eq!(EventType::from_discriminator(kind.type_name()), Some(kind));
            assert_eq!(EventType::from_discriminator(kind.key()), Some(kind));
        }
        assert_eq!(EventType::from_discriminator("https://example.org#Thing"), None);
    }

    #[test]
    fn from_str_only_accepts_short_keys() {
        assert_eq!("status-update".parse::<EventType>(), Ok(EventType::StatusUpdate));
        assert_eq!(
            "PermitStatus".parse::<EventType>(),
            Err(CodecError::UnsupportedEventType("PermitStatus".into()))
        );
    }
}
