//! `validate` subcommand

use anyhow::{Context, Result};
use clap::Args;
use openpermit_core::effects::{DocumentValidator, ShapeSource, ValidationOutcome};
use openpermit_shapes::{JsonSchemaEngine, SchemaValidator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Permit event document (JSON)
    pub file: PathBuf,

    /// Shape set file; defaults to the configured or bundled set
    #[arg(long)]
    pub shapes: Option<PathBuf>,
}

/// Check the document at `file` against `shapes`
pub fn check_file(file: &Path, shapes: ShapeSource) -> Result<ValidationOutcome> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let document: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let validator = SchemaValidator::load(JsonSchemaEngine::new(), shapes)?;
    Ok(validator.validate(&document))
}

pub fn run(cmd: &ValidateCommand, shapes: ShapeSource) -> Result<ExitCode> {
    let outcome = check_file(&cmd.file, shapes)?;
    if outcome.conforms {
        println!("{}: conforms", cmd.file.display());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}: does not conform", cmd.file.display());
        println!("{}", outcome.diagnostics);
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shapes() -> ShapeSource {
        ShapeSource::Inline(json!({
            "type": "object",
            "required": ["permitId"],
            "properties": { "permitId": { "type": "string" } }
        }))
    }

    #[test]
    fn reports_conformance() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, r#"{"permitId": "PERMIT-1"}"#).unwrap();
        std::fs::write(&bad, r#"{"permitId": 7}"#).unwrap();

        assert!(check_file(&good, shapes()).unwrap().conforms);
        let outcome = check_file(&bad, shapes()).unwrap();
        assert!(!outcome.conforms);
        assert!(!outcome.diagnostics.is_empty());
    }

    #[test]
    fn unreadable_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();

        assert!(check_file(&dir.path().join("missing.json"), shapes()).is_err());
        assert!(check_file(&garbage, shapes()).is_err());
    }
}
