//! Permit Bridge
//!
//! Orchestrates both directions between the permit workflow and the chat
//! transport.
//!
//! Outbound, an event goes `Built → Validated → Sent`: the codec builds it,
//! the validator checks the wire document, the room directory resolves the
//! permit's room and the transport sends it. Any failure ends the call with
//! nothing sent.
//!
//! Inbound, a raw message goes `Received → ParseAttempted → Dropped` or
//! `→ Validated → Dispatched`. Inbound failures are logged and reported in
//! the [`InboundOutcome`], never raised.

use crate::config::BridgeConfig;
use crate::inbound::{
    plan_side_effects, DispatchAction, DropReason, InboundMessage, InboundOutcome, SideEffect,
};
use crate::room::RoomDirectory;
use openpermit_core::effects::{
    ChatTransport, DocumentValidator, MediaStore, RawMessage, SubmissionUpdater,
};
use openpermit_core::{
    build_event, build_typed_event, parse_event, BridgeError, EventOptions, EventType, Payload,
    PermitEvent, PermitId, Result, UserId, EVENT_CONTENT_TYPE,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// An event the workflow wants posted to its permit room
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    permit_id: PermitId,
    event_type: String,
    payload: Payload,
    options: EventOptions,
    participants: Vec<UserId>,
}

impl OutboundEvent {
    /// Event of the kind named by `event_type` (e.g. `"status-update"`)
    ///
    /// The kind is checked when the event is sent.
    pub fn new(
        permit_id: impl Into<PermitId>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            permit_id: permit_id.into(),
            event_type: event_type.into(),
            payload,
            options: EventOptions::default(),
            participants: Vec::new(),
        }
    }

    /// Event of a known kind
    pub fn typed(permit_id: impl Into<PermitId>, event_type: EventType, payload: Payload) -> Self {
        Self::new(permit_id, event_type.key(), payload)
    }

    /// Workflow status carried by the event
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.options = self.options.with_status(status);
        self
    }

    /// User the event is attributed to
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.options = self.options.with_actor(actor);
        self
    }

    /// Earlier event this one continues
    pub fn thread_root(mut self, thread_root: impl Into<String>) -> Self {
        self.options = self.options.with_thread_root(thread_root);
        self
    }

    /// Also invite `users` to the permit room
    pub fn participants(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.participants.extend(users);
        self
    }

    /// Permit the event is for
    pub fn permit_id(&self) -> &PermitId {
        &self.permit_id
    }
}

/// An inspection photo to ingest and announce
#[derive(Debug, Clone, PartialEq)]
pub struct MediaShare {
    permit_id: PermitId,
    file_path: PathBuf,
    lat: f64,
    lon: f64,
    options: EventOptions,
}

impl MediaShare {
    /// Photo at `file_path`, taken at `lat`/`lon`
    pub fn new(permit_id: impl Into<PermitId>, file_path: impl Into<PathBuf>, lat: f64, lon: f64) -> Self {
        Self {
            permit_id: permit_id.into(),
            file_path: file_path.into(),
            lat,
            lon,
            options: EventOptions::default(),
        }
    }

    /// User the upload is attributed to
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.options = self.options.with_actor(actor);
        self
    }

    /// Earlier event the photo belongs to
    pub fn thread_root(mut self, thread_root: impl Into<String>) -> Self {
        self.options = self.options.with_thread_root(thread_root);
        self
    }
}

/// An event whose wire document passed validation
struct ValidatedEvent {
    event: PermitEvent,
    document: Value,
}

/// Bridge between the permit workflow and per-permit chat rooms
pub struct PermitBridge {
    transport: Arc<dyn ChatTransport>,
    directory: RoomDirectory,
    validator: Arc<dyn DocumentValidator>,
    submissions: Arc<dyn SubmissionUpdater>,
    media: Arc<dyn MediaStore>,
    own_user: UserId,
}

impl PermitBridge {
    /// Assemble a bridge
    ///
    /// # Arguments
    /// * `config` - alias scheme, default participants and bridge identity
    /// * `transport` - logged-in chat transport
    /// * `validator` - shape validator applied in both directions
    /// * `submissions` - receives inbound submission updates
    /// * `media` - ingests inspection photos
    pub fn new(
        config: &BridgeConfig,
        transport: Arc<dyn ChatTransport>,
        validator: Arc<dyn DocumentValidator>,
        submissions: Arc<dyn SubmissionUpdater>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            directory: RoomDirectory::new(transport.clone(), config),
            transport,
            validator,
            submissions,
            media,
            own_user: config.user_id.clone(),
        }
    }

    /// Room directory shared by every send
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// User the bridge acts as
    pub fn user_id(&self) -> &UserId {
        &self.own_user
    }

    /// Build, validate and send a permit event
    ///
    /// An unknown event kind fails before any transport call. A document the
    /// validator rejects fails with [`BridgeError::ValidationRejected`] before
    /// the room is resolved. On success the sent event is returned.
    #[instrument(skip(self, request), fields(permit_id = %request.permit_id, event_type = %request.event_type))]
    pub async fn send_permit_event(&self, request: OutboundEvent) -> Result<PermitEvent> {
        let OutboundEvent {
            permit_id,
            event_type,
            payload,
            options,
            participants,
        } = request;

        let event = build_event(&permit_id, &event_type, payload, options)?;
        let validated = self.validate(event)?;
        self.deliver(validated, &participants).await
    }

    /// Upload an inspection photo and announce it in the permit room
    ///
    /// Upload failures surface as [`BridgeError::Media`] carrying the media
    /// collaborator's own error.
    #[instrument(skip(self, share), fields(permit_id = %share.permit_id, path = %share.file_path.display()))]
    pub async fn send_inspection_media(&self, share: MediaShare) -> Result<PermitEvent> {
        let stored = self
            .media
            .upload_photo(&share.file_path, share.lat, share.lon)
            .await?;

        let mut payload = Payload::new();
        payload.insert(
            "mediaPath".into(),
            stored.stored_path.display().to_string().into(),
        );
        payload.insert(
            "location".into(),
            json!({ "lat": stored.location.lat, "lon": stored.location.lon }),
        );
        payload.insert("analysis".into(), stored.analysis);

        let event = build_typed_event(
            &share.permit_id,
            EventType::InspectionMedia,
            payload,
            share.options,
        );
        let validated = self.validate(event)?;
        self.deliver(validated, &[]).await
    }

    fn validate(&self, event: PermitEvent) -> Result<ValidatedEvent> {
        let document = event.to_document();
        let outcome = self.validator.validate(&document);
        if !outcome.conforms {
            warn!(
                permit_id = %event.permit_id(),
                event_type = %event.event_type(),
                diagnostics = %outcome.diagnostics,
                "Outbound event rejected by shape validation"
            );
            return Err(BridgeError::ValidationRejected {
                diagnostics: outcome.diagnostics,
            });
        }
        Ok(ValidatedEvent { event, document })
    }

    async fn deliver(&self, validated: ValidatedEvent, participants: &[UserId]) -> Result<PermitEvent> {
        let ValidatedEvent { event, document } = validated;
        let room = self
            .directory
            .ensure_room(event.permit_id(), participants)
            .await?;

        self.transport
            .send(&room, EVENT_CONTENT_TYPE, &document)
            .await?;

        info!(
            permit_id = %event.permit_id(),
            event_type = %event.event_type(),
            room = %room,
            "Sent permit event"
        );
        Ok(event)
    }

    /// Handle one raw message from the transport
    ///
    /// Never fails: messages that are not permit events are ignored, permit
    /// events that do not parse or validate are dropped, and collaborator
    /// failures during dispatch are logged and recorded in the outcome.
    pub async fn handle_inbound(&self, raw: &RawMessage) -> InboundOutcome {
        let document = match InboundMessage::classify(raw, &self.own_user) {
            InboundMessage::PermitEvent { document } => document,
            InboundMessage::Echo
            | InboundMessage::Chat
            | InboundMessage::Membership
            | InboundMessage::Other { .. } => {
                debug!(event_id = %raw.event_id, event_type = %raw.event_type, sender = %raw.sender, "Ignoring inbound message");
                return InboundOutcome::Ignored {
                    event_type: raw.event_type.clone(),
                };
            }
        };

        let event = match parse_event(document) {
            Ok(event) => event,
            Err(err) => {
                warn!(event_id = %raw.event_id, room = %raw.room, error = %err, "Dropping unparseable permit event");
                return InboundOutcome::Dropped {
                    event_id: raw.event_id.clone(),
                    reason: DropReason::Parse(err),
                };
            }
        };

        let outcome = self.validator.validate(document);
        if !outcome.conforms {
            warn!(
                event_id = %raw.event_id,
                permit_id = %event.permit_id(),
                diagnostics = %outcome.diagnostics,
                "Dropping permit event that failed shape validation"
            );
            return InboundOutcome::Dropped {
                event_id: raw.event_id.clone(),
                reason: DropReason::Rejected {
                    diagnostics: outcome.diagnostics,
                },
            };
        }

        let mut actions = Vec::new();
        for effect in plan_side_effects(&event) {
            actions.push(self.execute(event.permit_id(), effect).await);
        }

        debug!(
            event_id = %raw.event_id,
            permit_id = %event.permit_id(),
            event_type = %event.event_type(),
            actions = actions.len(),
            "Dispatched inbound permit event"
        );
        InboundOutcome::Dispatched {
            permit_id: event.permit_id().clone(),
            event_type: event.event_type(),
            actions,
        }
    }

    async fn execute(&self, permit_id: &PermitId, effect: SideEffect) -> DispatchAction {
        match effect {
            SideEffect::UpdateSubmission {
                path,
                update,
                actor,
            } => match self.submissions.update_submission(&path, &update, &actor) {
                Ok(()) => {
                    info!(permit_id = %permit_id, path = %path.display(), status = %update.status, actor = %actor, "Updated submission from inbound event");
                    DispatchAction::SubmissionUpdated { path }
                }
                Err(err) => {
                    warn!(permit_id = %permit_id, path = %path.display(), error = %err, "Submission update failed");
                    DispatchAction::SubmissionFailed {
                        path,
                        error: err.to_string(),
                    }
                }
            },
            SideEffect::IngestMedia { path, lat, lon } => {
                match self.media.upload_photo(&path, lat, lon).await {
                    Ok(stored) => {
                        info!(permit_id = %permit_id, path = %path.display(), "Ingested inspection media");
                        DispatchAction::MediaIngested { stored }
                    }
                    Err(error) => {
                        warn!(permit_id = %permit_id, path = %path.display(), error = %error, "Inspection media ingestion failed");
                        DispatchAction::MediaFailed { path, error }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for PermitBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitBridge")
            .field("own_user", &self.own_user)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
