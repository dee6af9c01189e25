//! Inbound pipeline: classify, parse, validate, dispatch

mod common;

use assert_matches::assert_matches;
use common::{Harness, ALICE};
use openpermit_bridge::{DispatchAction, DropReason, InboundOutcome, PermitBridge};
use openpermit_core::effects::{MediaError, SubmissionUpdater};
use openpermit_core::{CodecError, EventType, PermitId};
use openpermit_testkit::{
    permit_document, raw_message, raw_permit_event, StaticValidator, BOT_USER,
};
use openpermit_workflow::{AuditTrail, SubmissionStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn status_update(permit: &str, path: &str, status: &str) -> serde_json::Value {
    let mut doc = permit_document(permit, "status-update", json!({ "submissionPath": path }));
    doc["status"] = json!(status);
    doc
}

#[tokio::test]
async fn unrecognised_content_type_is_ignored() {
    let h = Harness::bundled().await;
    let raw = raw_message(
        ALICE,
        "m.room.message",
        json!({"msgtype": "m.text", "body": "status-update submissionPath=x"}),
    );

    let outcome = h.bridge.handle_inbound(&raw).await;

    assert_eq!(
        outcome,
        InboundOutcome::Ignored {
            event_type: "m.room.message".into()
        }
    );
    assert_eq!(h.submissions.count(), 0);
    assert_eq!(h.media.count(), 0);
}

#[tokio::test]
async fn own_echo_is_ignored() {
    let h = Harness::bundled().await;
    let raw = raw_permit_event(BOT_USER, status_update("PERMIT-1", "s.json", "approved"));

    assert_matches!(h.bridge.handle_inbound(&raw).await, InboundOutcome::Ignored { .. });
    assert_eq!(h.submissions.count(), 0);
}

#[tokio::test]
async fn missing_discriminator_is_dropped() {
    let h = Harness::bundled().await;
    let raw = raw_permit_event(
        ALICE,
        json!({"permitId": "PERMIT-1", "occurredAt": "2024-05-01T12:00:00Z", "payload": {}}),
    );

    let outcome = h.bridge.handle_inbound(&raw).await;
    assert_matches!(
        outcome,
        InboundOutcome::Dropped { reason: DropReason::Parse(CodecError::Parse(msg)), .. }
            if msg == "missing type discriminator"
    );
}

#[tokio::test]
async fn unknown_kind_is_dropped() {
    let h = Harness::bundled().await;
    let raw = raw_permit_event(ALICE, permit_document("PERMIT-1", "demolition", json!({})));

    assert_matches!(
        h.bridge.handle_inbound(&raw).await,
        InboundOutcome::Dropped {
            reason: DropReason::Parse(CodecError::UnsupportedEventType(_)),
            ..
        }
    );
}

#[tokio::test]
async fn parsed_but_nonconforming_event_is_dropped_without_side_effects() {
    let h = Harness::bundled().await;
    // Parses fine, but the bundled shapes require an in-range location.
    let mut doc = permit_document(
        "PERMIT-2",
        "inspection-media",
        json!({
            "submissionPath": "submissions/PERMIT-2.json",
            "mediaPath": "media/site.jpg",
            "location": {"lat": 123.0, "lon": 10.0}
        }),
    );
    doc["status"] = json!("inspected");

    let outcome = h.bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_matches!(
        outcome,
        InboundOutcome::Dropped { reason: DropReason::Rejected { diagnostics }, .. }
            if !diagnostics.is_empty()
    );
    assert_eq!(h.submissions.count(), 0);
    assert_eq!(h.media.count(), 0);
}

#[tokio::test]
async fn media_event_typed_only_by_iri_is_still_shape_checked() {
    let h = Harness::bundled().await;
    let mut doc = permit_document(
        "PERMIT-2",
        "inspection-media",
        json!({"mediaPath": "media/site.jpg", "location": {"lat": 500, "lon": 900}}),
    );
    doc["@type"] = json!("https://openpermit.io/ontology#InspectionMedia");
    doc.as_object_mut().unwrap().remove("eventType");

    let outcome = h.bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_matches!(
        outcome,
        InboundOutcome::Dropped { reason: DropReason::Rejected { diagnostics }, .. }
            if diagnostics.contains("/payload/location")
    );
    assert_eq!(h.media.count(), 0);
}

#[tokio::test]
async fn rejecting_validator_blocks_dispatch() {
    let validator = Arc::new(StaticValidator::rejecting("payload: not allowed"));
    let h = Harness::with_validator(validator.clone()).await;

    let outcome = h
        .bridge
        .handle_inbound(&raw_permit_event(
            ALICE,
            status_update("PERMIT-3", "submissions/PERMIT-3.json", "approved"),
        ))
        .await;

    assert!(!outcome.is_dispatched());
    assert_eq!(validator.calls(), 1);
    assert_eq!(h.submissions.count(), 0);
}

#[tokio::test]
async fn status_with_submission_path_updates_the_submission() {
    let h = Harness::bundled().await;

    let outcome = h
        .bridge
        .handle_inbound(&raw_permit_event(
            ALICE,
            status_update("PERMIT-4", "submissions/PERMIT-4.json", "approved"),
        ))
        .await;

    assert_eq!(
        outcome,
        InboundOutcome::Dispatched {
            permit_id: PermitId::new("PERMIT-4"),
            event_type: EventType::StatusUpdate,
            actions: vec![DispatchAction::SubmissionUpdated {
                path: PathBuf::from("submissions/PERMIT-4.json")
            }],
        }
    );

    let updates = h.submissions.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].update.status, "approved");
    assert_eq!(
        updates[0].update.data,
        json!({"submissionPath": "submissions/PERMIT-4.json"})
    );
    assert_eq!(updates[0].actor, "matrix");
}

#[tokio::test]
async fn event_actor_is_passed_to_the_submission_update() {
    let h = Harness::bundled().await;
    let mut doc = status_update("PERMIT-5", "submissions/PERMIT-5.json", "needs-info");
    doc["actor"] = json!("bob");

    h.bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_eq!(h.submissions.updates()[0].actor, "bob");
}

#[tokio::test]
async fn collaborator_failure_is_recorded_not_raised() {
    let h = Harness::bundled().await;
    h.submissions.fail_updates();

    let outcome = h
        .bridge
        .handle_inbound(&raw_permit_event(
            ALICE,
            status_update("PERMIT-6", "submissions/PERMIT-6.json", "approved"),
        ))
        .await;

    assert_matches!(
        outcome,
        InboundOutcome::Dispatched { actions, .. }
            if matches!(actions.as_slice(), [DispatchAction::SubmissionFailed { .. }])
    );
}

#[tokio::test]
async fn inspection_media_is_ingested() {
    let h = Harness::bundled().await;
    let doc = permit_document(
        "PERMIT-7",
        "inspection-media",
        json!({
            "mediaPath": "media/site.jpg",
            "location": {"latitude": "47.61", "longitude": "-122.33"}
        }),
    );

    let outcome = h.bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_matches!(
        outcome,
        InboundOutcome::Dispatched { event_type: EventType::InspectionMedia, actions, .. }
            if matches!(actions.as_slice(), [DispatchAction::MediaIngested { .. }])
    );
    let uploads = h.media.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, PathBuf::from("media/site.jpg"));
    assert_eq!((uploads[0].lat, uploads[0].lon), (47.61, -122.33));
}

#[tokio::test]
async fn media_ingestion_failure_is_logged_not_raised() {
    let h = Harness::bundled().await;
    h.media
        .fail_next(MediaError::FileNotFound(PathBuf::from("media/gone.jpg")));
    let doc = permit_document(
        "PERMIT-8",
        "inspection-media",
        json!({"mediaPath": "media/gone.jpg", "location": {"lat": 1.5, "lon": 2.5}}),
    );

    let outcome = h.bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_matches!(
        outcome,
        InboundOutcome::Dispatched { actions, .. }
            if matches!(
                actions.as_slice(),
                [DispatchAction::MediaFailed { error: MediaError::FileNotFound(_), .. }]
            )
    );
}

#[tokio::test]
async fn dispatch_writes_submission_and_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let trail = Arc::new(AuditTrail::new(dir.path().join("audit.log")));
    let store: Arc<dyn SubmissionUpdater> = Arc::new(SubmissionStore::new(dir.path().join("submissions"), trail.clone()));
    let h = Harness::bundled().await;
    let bridge = PermitBridge::new(
        &h.config,
        Arc::new(h.bot.clone()),
        Arc::new(openpermit_shapes::SchemaValidator::bundled().unwrap()),
        store,
        h.media.clone(),
    );

    let path = dir.path().join("submissions/PERMIT-9.json");
    let mut doc = status_update("PERMIT-9", &path.display().to_string(), "approved");
    doc["actor"] = json!("alice");

    let outcome = bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;
    assert!(outcome.is_dispatched());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["status"], "approved");

    let entries = trail.read().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user, "alice");
    assert_eq!(entries[0].action, "update");
}

#[tokio::test]
async fn submission_paths_cannot_leave_the_store_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("submissions");
    let trail = Arc::new(AuditTrail::new(dir.path().join("audit.log")));
    let store: Arc<dyn SubmissionUpdater> = Arc::new(SubmissionStore::new(&root, trail.clone()));
    let h = Harness::bundled().await;
    let bridge = PermitBridge::new(
        &h.config,
        Arc::new(h.bot.clone()),
        Arc::new(openpermit_shapes::SchemaValidator::bundled().unwrap()),
        store,
        h.media.clone(),
    );

    let escape = root.join("../audit.log");
    let doc = status_update("PERMIT-9", &escape.display().to_string(), "approved");
    let outcome = bridge.handle_inbound(&raw_permit_event(ALICE, doc)).await;

    assert_matches!(
        outcome,
        InboundOutcome::Dispatched { actions, .. }
            if matches!(actions.as_slice(), [DispatchAction::SubmissionFailed { .. }])
    );
    assert!(!dir.path().join("audit.log").exists());
    assert!(trail.read().unwrap().is_empty());
}
