//! Sync loop against the memory homeserver

mod common;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{Harness, ALICE};
use openpermit_bridge::{
    InboundDispatcher, OutboundEvent, StopHandle, SyncConfig, SyncLoop, SyncStats,
};
use openpermit_core::effects::{ChatTransport, MediaError, MediaStore, Session, StoredMedia};
use openpermit_core::{BridgeError, EventType, PermitId, UserId, EVENT_CONTENT_TYPE};
use openpermit_testkit::{
    payload, permit_document, raw_message, raw_permit_event, user_client, RecordingMedia,
    BOT_USER,
};
use openpermit_transport::{MemoryFault, RetryPolicy};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

fn fast_sync() -> SyncConfig {
    SyncConfig {
        poll_timeout_ms: 50,
        retry: RetryPolicy::fixed(Duration::from_millis(10)),
    }
}

fn bot_session() -> Session {
    Session::new(UserId::new(BOT_USER), None)
}

fn spawn_loop(h: &Harness, config: SyncConfig, stop: &StopHandle) -> JoinHandle<openpermit_core::Result<SyncStats>> {
    let sync = SyncLoop::new(Arc::new(h.bot.clone()), h.bridge.clone(), config);
    let signal = stop.signal();
    tokio::spawn(async move { sync.run_forever(&bot_session(), signal).await })
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn replies_from_participants_are_dispatched() {
    let h = Harness::bundled().await;
    let permit = PermitId::new("PERMIT-10");

    h.bridge
        .send_permit_event(
            OutboundEvent::typed(permit.clone(), EventType::Submission, payload(json!({})))
                .participants([UserId::new(ALICE)]),
        )
        .await
        .unwrap();

    let alice = user_client(&h.server, ALICE);
    alice.login().await.unwrap();
    let room = alice
        .join_room(&h.bridge.directory().alias_for(&permit))
        .await
        .unwrap();

    let stop = StopHandle::new();
    let task = spawn_loop(&h, fast_sync(), &stop);

    let mut reply = permit_document(
        "PERMIT-10",
        "status-update",
        json!({"submissionPath": "submissions/PERMIT-10.json"}),
    );
    reply["status"] = json!("approved");
    reply["actor"] = json!("alice");
    alice.send(&room, EVENT_CONTENT_TYPE, &reply).await.unwrap();
    alice
        .send(&room, "m.room.message", &json!({"body": "thanks!"}))
        .await
        .unwrap();

    let submissions = h.submissions.clone();
    eventually(move || submissions.count() == 1).await;
    stop.stop();

    let stats = task.await.unwrap().unwrap();
    assert!(stats.polls >= 1);
    assert_eq!(stats.messages, 2);
    assert_eq!(stats.dispatch.dispatched, 1);
    assert_eq!(stats.dispatch.ignored, 1);
    assert_eq!(stats.transient_errors, 0);
    assert_eq!(h.submissions.updates()[0].actor, "alice");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = Harness::bundled().await;
    h.bot.inject_fault(MemoryFault::WaitTimeout);
    h.bot.inject_fault(MemoryFault::WaitDisconnected);

    let stop = StopHandle::new();
    let task = spawn_loop(&h, fast_sync(), &stop);

    let bot = h.bot.clone();
    eventually(move || bot.calls().wait_for_updates >= 3).await;
    stop.stop();

    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.transient_errors, 2);
    assert!(stats.polls >= 3);
}

#[tokio::test]
async fn losing_authentication_ends_the_loop() {
    let h = Harness::bundled().await;
    let stop = StopHandle::new();
    let task = spawn_loop(&h, fast_sync(), &stop);

    let bot = h.bot.clone();
    eventually(move || bot.calls().wait_for_updates >= 1).await;
    h.server.revoke_sessions(h.bot.user_id());

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(BridgeError::Auth(_)));
}

#[tokio::test]
async fn stop_interrupts_a_long_poll() {
    let h = Harness::bundled().await;
    let config = SyncConfig {
        poll_timeout_ms: 60_000,
        ..fast_sync()
    };
    let stop = StopHandle::new();
    let task = spawn_loop(&h, config, &stop);

    let bot = h.bot.clone();
    eventually(move || bot.calls().wait_for_updates >= 1).await;
    stop.stop();

    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.messages, 0);
}

#[tokio::test]
async fn bounded_retries_escalate() {
    let h = Harness::bundled().await;
    for _ in 0..3 {
        h.bot.inject_fault(MemoryFault::WaitDisconnected);
    }
    let config = SyncConfig {
        retry: RetryPolicy {
            max_consecutive_failures: Some(2),
            ..RetryPolicy::fixed(Duration::from_millis(5))
        },
        ..fast_sync()
    };
    let stop = StopHandle::new();

    let result = tokio::time::timeout(Duration::from_secs(2), spawn_loop(&h, config, &stop))
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(BridgeError::Transport(_)));
}

#[tokio::test]
async fn session_must_belong_to_the_bridge_user() {
    let h = Harness::bundled().await;
    let sync = SyncLoop::new(Arc::new(h.bot.clone()), h.bridge.clone(), fast_sync());
    let stop = StopHandle::new();

    let err = sync
        .run_forever(&Session::new(UserId::new(ALICE), None), stop.signal())
        .await
        .unwrap_err();
    assert_matches!(err, BridgeError::Config(_));
    assert_eq!(h.bot.calls().wait_for_updates, 0);
}

#[tokio::test]
async fn dispatcher_drains_queue_without_a_transport() {
    let h = Harness::bundled().await;
    let (tx, rx) = mpsc::channel(8);

    let mut update = permit_document(
        "PERMIT-11",
        "status-update",
        json!({"submissionPath": "submissions/PERMIT-11.json"}),
    );
    update["status"] = json!("approved");
    tx.send(raw_permit_event(ALICE, update)).await.unwrap();
    tx.send(raw_permit_event(ALICE, json!({"permitId": "PERMIT-11"})))
        .await
        .unwrap();
    tx.send(raw_message(ALICE, "m.room.member", json!({"membership": "join"})))
        .await
        .unwrap();
    drop(tx);

    let stats = InboundDispatcher::new(h.bridge.clone()).run(rx).await;
    assert_eq!(stats.received, 3);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.ignored, 1);
    assert_eq!(h.submissions.count(), 1);
}

/// Media store whose uploads wait until the test opens the gate
#[derive(Debug)]
struct GatedMedia {
    inner: RecordingMedia,
    gate: Semaphore,
    entered: AtomicUsize,
}

impl GatedMedia {
    fn new() -> Self {
        Self {
            inner: RecordingMedia::new(),
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        }
    }

    fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl MediaStore for GatedMedia {
    async fn upload_photo(&self, path: &Path, lat: f64, lon: f64) -> Result<StoredMedia, MediaError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.unwrap();
        self.inner.upload_photo(path, lat, lon).await
    }
}

#[tokio::test]
async fn stop_is_not_held_up_by_a_full_queue() {
    let media = Arc::new(GatedMedia::new());
    let h = Harness::with_media(media.clone()).await;
    let permit = PermitId::new("PERMIT-12");

    h.bridge
        .send_permit_event(
            OutboundEvent::typed(permit.clone(), EventType::Submission, payload(json!({})))
                .participants([UserId::new(ALICE)]),
        )
        .await
        .unwrap();
    let alice = user_client(&h.server, ALICE);
    alice.login().await.unwrap();
    let room = alice
        .join_room(&h.bridge.directory().alias_for(&permit))
        .await
        .unwrap();

    let photo = permit_document(
        "PERMIT-12",
        "inspection-media",
        json!({"mediaPath": "media/site.jpg", "location": {"lat": 47.61, "lon": -122.33}}),
    );
    alice.send(&room, EVENT_CONTENT_TYPE, &photo).await.unwrap();
    for n in 0..4 {
        alice
            .send(&room, "m.room.message", &json!({"body": format!("note {n}")}))
            .await
            .unwrap();
    }

    let sync = SyncLoop::new(Arc::new(h.bot.clone()), h.bridge.clone(), fast_sync())
        .with_queue_capacity(1);
    let stop = StopHandle::new();
    let signal = stop.signal();
    let task = tokio::spawn(async move { sync.run_forever(&bot_session(), signal).await });

    let gated = media.clone();
    eventually(move || gated.entered() == 1).await;
    stop.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;
    media.open();

    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(stats.dispatch.received < stats.messages);
    assert_eq!(media.inner.count(), 1);
}
