//! `demo` subcommand
//!
//! Runs the bridge against an in-memory homeserver: the workflow opens a
//! permit thread, a reviewer replies from their own client, and the reply is
//! dispatched into a submission store under the working directory.

use anyhow::{bail, Context, Result};
use clap::Args;
use openpermit_bridge::{
    payload_from, BridgeConfig, PermitParticipant, PermitService, StopHandle, SyncConfig,
};
use openpermit_core::effects::ChatTransport;
use openpermit_core::{
    build_typed_event, EventOptions, EventType, PermitId, UserId, EVENT_CONTENT_TYPE,
};
use openpermit_transport::{MemoryHomeserver, RetryPolicy};
use openpermit_workflow::{AuditTrail, PhotoInspection, SubmissionStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

const SERVER_NAME: &str = "openpermit";
const BOT: (&str, &str) = ("@permits:openpermit", "permits-token");
const APPLICANT: (&str, &str) = ("@alice:openpermit", "alice-token");
const CLERK: (&str, &str) = ("@clerk:openpermit", "clerk-token");

const DISPATCH_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct DemoCommand {
    /// Directory for submissions and the audit log
    #[arg(long, default_value = "openpermit-demo")]
    pub workdir: PathBuf,

    /// Permit to walk through
    #[arg(long, default_value = "PERMIT-123")]
    pub permit: String,
}

/// What the demo did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub room: String,
    pub alias: String,
    pub submission: PathBuf,
    pub audit_actions: Vec<(String, String)>,
    pub messages_seen: u64,
    pub dispatched: u64,
}

pub async fn run(cmd: &DemoCommand) -> Result<()> {
    let report = execute(cmd).await?;
    println!("room        {} ({})", report.alias, report.room);
    println!("submission  {}", report.submission.display());
    println!(
        "sync        {} messages seen, {} dispatched",
        report.messages_seen, report.dispatched
    );
    for (user, action) in &report.audit_actions {
        println!("audit       {action} by {user}");
    }
    Ok(())
}

/// Run the walkthrough and collect its report
pub async fn execute(cmd: &DemoCommand) -> Result<DemoReport> {
    let permit = PermitId::new(cmd.permit.as_str());
    let server = MemoryHomeserver::new(SERVER_NAME);
    for (user, token) in [BOT, APPLICANT, CLERK] {
        server.register_user(user, token);
    }

    let trail = Arc::new(AuditTrail::new(cmd.workdir.join("audit.log")));
    let store = Arc::new(SubmissionStore::new(&cmd.workdir, trail.clone()));
    let submission = cmd
        .workdir
        .join("submissions")
        .join(format!("{}.json", permit.as_str()));
    store.create_submission(
        &submission,
        &json!({"permitId": permit.as_str(), "address": "1 Main St"}),
        APPLICANT.0,
    )?;

    let mut config = BridgeConfig::new(BOT.0)
        .with_access_token(BOT.1)
        .with_participant(CLERK.0);
    config.alias_server = SERVER_NAME.to_string();
    config.sync = SyncConfig {
        poll_timeout_ms: 200,
        retry: RetryPolicy::fixed(Duration::from_millis(50)),
    };

    let (service, session) = PermitService::connect(
        &config,
        Arc::new(server.client(BOT.0, BOT.1)),
        store,
        Arc::new(PhotoInspection::new()),
    )
    .await?;

    let room = service
        .start_permit_thread(&PermitParticipant {
            permit_id: permit.clone(),
            user_ids: vec![UserId::new(APPLICANT.0)],
        })
        .await?;
    let alias = service.bridge().directory().alias_for(&permit);
    info!(room = %room, alias = %alias, "Permit thread open");

    let stop = StopHandle::new();
    let sync = service.sync_loop(config.sync.clone());
    let signal = stop.signal();
    let sync_task = tokio::spawn(async move { sync.run_forever(&session, signal).await });

    let applicant = server.client(APPLICANT.0, APPLICANT.1);
    applicant.login().await?;
    let joined = applicant.join_room(&alias).await?;
    let reply = build_typed_event(
        &permit,
        EventType::StatusUpdate,
        payload_from(json!({"submissionPath": submission.display().to_string()})),
        EventOptions::default()
            .with_status("approved")
            .with_actor(APPLICANT.0),
    );
    applicant
        .send(&joined, EVENT_CONTENT_TYPE, &reply.to_document())
        .await?;

    let dispatched = wait_for_update(&trail).await;
    stop.stop();
    let stats = sync_task.await.context("sync loop task panicked")??;
    if !dispatched {
        bail!("reply was not dispatched within {DISPATCH_DEADLINE:?}");
    }

    let audit_actions = trail
        .read()?
        .into_iter()
        .map(|entry| (entry.user, entry.action))
        .collect();
    Ok(DemoReport {
        room: room.to_string(),
        alias: alias.to_string(),
        submission,
        audit_actions,
        messages_seen: stats.messages,
        dispatched: stats.dispatch.dispatched,
    })
}

// A read racing an append can see a torn line; that counts as not yet.
async fn wait_for_update(trail: &AuditTrail) -> bool {
    let deadline = Instant::now() + DISPATCH_DEADLINE;
    while Instant::now() < deadline {
        if matches!(trail.read(), Ok(entries) if entries.iter().any(|e| e.action == "update")) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
