//! Workflow-facing permit service
//!
//! Thin operations the permit workflow calls directly: open a permit's
//! thread, announce status changes, approvals and inspections, and share
//! inspection photos. Each one is a single [`PermitBridge`] send.

use crate::bridge::{MediaShare, OutboundEvent, PermitBridge};
use crate::config::{BridgeConfig, SyncConfig};
use crate::sync::SyncLoop;
use chrono::{DateTime, SecondsFormat, Utc};
use openpermit_core::effects::{
    ChatTransport, DocumentValidator, MediaStore, Session, SubmissionUpdater,
};
use openpermit_core::{EventType, Payload, PermitEvent, PermitId, Result, RoomHandle, UserId};
use openpermit_shapes::{JsonSchemaEngine, SchemaValidator};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Summary used when an approval carries no notes
pub const DEFAULT_APPROVAL_SUMMARY: &str = "Permit approved";

/// A permit and the users who should follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitParticipant {
    /// The permit
    pub permit_id: PermitId,
    /// Users to invite to its room
    pub user_ids: Vec<UserId>,
}

/// Permit workflow operations over a bridge
#[derive(Clone)]
pub struct PermitService {
    bridge: Arc<PermitBridge>,
    transport: Arc<dyn ChatTransport>,
}

impl PermitService {
    /// Log in, load the shape set and assemble a service
    ///
    /// Returns the service with the login session needed to start its sync
    /// loop. A rejected login fails with [`BridgeError::Auth`](openpermit_core::BridgeError::Auth).
    pub async fn connect(
        config: &BridgeConfig,
        transport: Arc<dyn ChatTransport>,
        submissions: Arc<dyn SubmissionUpdater>,
        media: Arc<dyn MediaStore>,
    ) -> Result<(Self, Session)> {
        config.validate()?;
        let session = transport.login().await?;
        info!(user = %session.user_id, homeserver = %config.homeserver, "Logged in");

        let validator: Arc<dyn DocumentValidator> = Arc::new(SchemaValidator::load(
            JsonSchemaEngine::new(),
            config.shape_source(),
        )?);
        let bridge = PermitBridge::new(config, transport.clone(), validator, submissions, media);
        Ok((Self::new(Arc::new(bridge), transport), session))
    }

    /// Service over an assembled bridge and the transport it sends through
    pub fn new(bridge: Arc<PermitBridge>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { bridge, transport }
    }

    /// The underlying bridge
    pub fn bridge(&self) -> &Arc<PermitBridge> {
        &self.bridge
    }

    /// Sync loop feeding inbound messages into this service's bridge
    pub fn sync_loop(&self, config: SyncConfig) -> SyncLoop {
        SyncLoop::new(self.transport.clone(), self.bridge.clone(), config)
    }

    /// Open the permit's room with `participant.user_ids` and post a submission event
    pub async fn start_permit_thread(&self, participant: &PermitParticipant) -> Result<RoomHandle> {
        let room = self
            .bridge
            .directory()
            .ensure_room(&participant.permit_id, &participant.user_ids)
            .await?;

        let mut payload = Payload::new();
        payload.insert(
            "summary".into(),
            format!("Permit {} submitted", participant.permit_id).into(),
        );
        self.bridge
            .send_permit_event(OutboundEvent::typed(
                participant.permit_id.clone(),
                EventType::Submission,
                payload,
            ))
            .await?;
        Ok(room)
    }

    /// Announce a status change; `data` becomes the event payload
    pub async fn notify_status(
        &self,
        permit_id: &PermitId,
        status: &str,
        data: Payload,
    ) -> Result<PermitEvent> {
        self.bridge
            .send_permit_event(
                OutboundEvent::typed(permit_id.clone(), EventType::StatusUpdate, data).status(status),
            )
            .await
    }

    /// Announce an approval by `approver`
    pub async fn push_approval(
        &self,
        permit_id: &PermitId,
        approver: &str,
        notes: Option<&str>,
    ) -> Result<PermitEvent> {
        let mut payload = Payload::new();
        payload.insert("approvedBy".into(), approver.into());
        payload.insert(
            "summary".into(),
            notes.unwrap_or(DEFAULT_APPROVAL_SUMMARY).into(),
        );
        self.bridge
            .send_permit_event(
                OutboundEvent::typed(permit_id.clone(), EventType::Approval, payload)
                    .status("approved")
                    .actor(approver),
            )
            .await
    }

    /// Announce a scheduled inspection
    pub async fn schedule_inspection(
        &self,
        permit_id: &PermitId,
        scheduled_for: DateTime<Utc>,
        inspector: Option<&UserId>,
    ) -> Result<PermitEvent> {
        let mut payload = Payload::new();
        payload.insert(
            "scheduledFor".into(),
            scheduled_for
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .into(),
        );
        let mut request = OutboundEvent::typed(permit_id.clone(), EventType::Inspection, payload)
            .status("inspection-scheduled");
        if let Some(inspector) = inspector {
            request = request
                .participants([inspector.clone()])
                .actor(inspector.as_str());
        }
        self.bridge.send_permit_event(request).await
    }

    /// Upload an inspection photo and post it to the permit's room
    pub async fn share_inspection_media(
        &self,
        permit_id: &PermitId,
        file_path: impl Into<PathBuf>,
        lat: f64,
        lon: f64,
        thread_root: Option<&str>,
    ) -> Result<PermitEvent> {
        let mut share = MediaShare::new(permit_id.clone(), file_path, lat, lon);
        if let Some(root) = thread_root {
            share = share.thread_root(root);
        }
        self.bridge.send_inspection_media(share).await
    }
}

impl std::fmt::Debug for PermitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitService")
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

/// Payload from a JSON object; anything else yields an empty payload
pub fn payload_from(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
