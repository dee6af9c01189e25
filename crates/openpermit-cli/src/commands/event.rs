//! `build-event` subcommand

use anyhow::{bail, Context, Result};
use clap::Args;
use openpermit_core::effects::{DocumentValidator, ShapeSource};
use openpermit_core::{build_event, EventOptions, Payload, PermitId};
use openpermit_shapes::{JsonSchemaEngine, SchemaValidator};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct BuildEventCommand {
    /// Permit identifier
    pub permit_id: String,

    /// Event type key, e.g. status-update
    #[arg(long = "type", value_name = "EVENT_TYPE")]
    pub event_type: String,

    /// Payload as a JSON object
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Workflow status
    #[arg(long)]
    pub status: Option<String>,

    /// Acting user
    #[arg(long)]
    pub actor: Option<String>,

    /// Event this one continues
    #[arg(long)]
    pub thread: Option<String>,

    /// Check the document against the shape set before printing
    #[arg(long)]
    pub validate: bool,

    /// Shape set file used with --validate
    #[arg(long)]
    pub shapes: Option<PathBuf>,
}

/// Build the wire document described by `cmd`
pub fn render(cmd: &BuildEventCommand) -> Result<Value> {
    let payload = parse_payload(&cmd.payload)?;
    let mut options = EventOptions::default();
    if let Some(status) = &cmd.status {
        options = options.with_status(status);
    }
    if let Some(actor) = &cmd.actor {
        options = options.with_actor(actor);
    }
    if let Some(thread) = &cmd.thread {
        options = options.with_thread_root(thread);
    }

    let event = build_event(
        &PermitId::new(cmd.permit_id.as_str()),
        &cmd.event_type,
        payload,
        options,
    )?;
    Ok(event.to_document())
}

pub fn run(cmd: &BuildEventCommand, shapes: ShapeSource) -> Result<ExitCode> {
    let document = render(cmd)?;

    if cmd.validate {
        let validator = SchemaValidator::load(JsonSchemaEngine::new(), shapes)?;
        let outcome = validator.validate(&document);
        if !outcome.conforms {
            eprintln!("{}", outcome.diagnostics);
            return Ok(ExitCode::FAILURE);
        }
    }

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(ExitCode::SUCCESS)
}

fn parse_payload(raw: &str) -> Result<Payload> {
    match serde_json::from_str(raw).context("payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("payload must be a JSON object, got {other}"),
    }
}
