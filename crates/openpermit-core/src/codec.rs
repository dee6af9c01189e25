//! Event codec
//!
//! Builds permit events and converts them to and from the JSON-LD wire
//! document carried in `org.openpermit.event` room messages. The codec does
//! not validate shapes; that is the validator's job.

use crate::errors::CodecError;
use crate::event::{EventType, Payload, PermitEvent, ONTOLOGY_IRI};
use crate::identifiers::PermitId;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};

/// Room message type carrying permit event documents
pub const EVENT_CONTENT_TYPE: &str = "org.openpermit.event";

/// Optional fields of an outbound event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOptions {
    /// Workflow status
    pub status: Option<String>,
    /// Acting user
    pub actor: Option<String>,
    /// Event this one continues
    pub thread_root: Option<String>,
}

impl EventOptions {
    /// Set the workflow status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set the acting user
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the thread root
    pub fn with_thread_root(mut self, thread_root: impl Into<String>) -> Self {
        self.thread_root = Some(thread_root.into());
        self
    }
}

/// Build an event from a caller-supplied event type key
///
/// Unknown keys are rejected before any other work happens.
pub fn build_event(
    permit_id: &PermitId,
    event_type: &str,
    payload: Payload,
    options: EventOptions,
) -> Result<PermitEvent, CodecError> {
    let event_type: EventType = event_type.parse()?;
    Ok(build_typed_event(permit_id, event_type, payload, options))
}

/// Build an event of a known kind, stamped with the current time
pub fn build_typed_event(
    permit_id: &PermitId,
    event_type: EventType,
    payload: Payload,
    options: EventOptions,
) -> PermitEvent {
    PermitEvent {
        event_type,
        permit_id: permit_id.clone(),
        occurred_at: Utc::now().trunc_subsecs(3),
        payload,
        status: options.status,
        actor: options.actor,
        thread_root: options.thread_root,
    }
}

impl PermitEvent {
    /// Render the wire document
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("@context".into(), Value::String(ONTOLOGY_IRI.to_string()));
        doc.insert("@type".into(), Value::String(self.event_type.iri()));
        doc.insert("eventType".into(), self.event_type.key().into());
        doc.insert("permitId".into(), self.permit_id.as_str().into());
        doc.insert(
            "occurredAt".into(),
            self.occurred_at
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        doc.insert("payload".into(), Value::Object(self.payload.clone()));
        if let Some(status) = &self.status {
            doc.insert("status".into(), status.as_str().into());
        }
        if let Some(actor) = &self.actor {
            doc.insert("actor".into(), actor.as_str().into());
        }
        if let Some(thread) = &self.thread_root {
            doc.insert("thread".into(), thread.as_str().into());
        }
        Value::Object(doc)
    }
}

/// Parse an inbound wire document
///
/// Requires a type discriminator (`@type`, falling back to `eventType`), a
/// permit id and an RFC 3339 `occurredAt`. A missing payload reads as empty.
pub fn parse_event(document: &Value) -> Result<PermitEvent, CodecError> {
    let doc = document
        .as_object()
        .ok_or_else(|| CodecError::parse("document is not an object"))?;

    let event_type = discriminator(doc)?;

    let permit_id = match doc.get("permitId") {
        Some(Value::String(id)) if !id.is_empty() => PermitId::new(id.as_str()),
        Some(_) => return Err(CodecError::parse("permitId is not a non-empty string")),
        None => return Err(CodecError::parse("missing permitId")),
    };

    let occurred_at = match doc.get("occurredAt") {
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| CodecError::parse(format!("invalid occurredAt '{raw}': {e}")))?
            .with_timezone(&Utc),
        Some(_) => return Err(CodecError::parse("occurredAt is not a string")),
        None => return Err(CodecError::parse("missing occurredAt")),
    };

    let payload = match doc.get("payload") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(CodecError::parse("payload is not an object")),
        None => Payload::new(),
    };

    Ok(PermitEvent {
        event_type,
        permit_id,
        occurred_at,
        payload,
        status: optional_string(doc, "status")?,
        actor: optional_string(doc, "actor")?,
        thread_root: optional_string(doc, "thread")?,
    })
}

fn discriminator(doc: &Map<String, Value>) -> Result<EventType, CodecError> {
    let candidates: Vec<&str> = ["@type", "eventType"]
        .iter()
        .filter_map(|field| doc.get(*field).and_then(Value::as_str))
        .collect();

    let first = candidates
        .first()
        .ok_or_else(|| CodecError::parse("missing type discriminator"))?;

    candidates
        .iter()
        .find_map(|value| EventType::from_discriminator(value))
        .ok_or_else(|| CodecError::UnsupportedEventType((*first).to_string()))
}

fn optional_string(doc: &Map<String, Value>, field: &str) -> Result<Option<String>, CodecError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(CodecError::parse(format!("{field} is not a string"))),
    }
}
