//! JSON Schema conformance engine
//!
//! Shape sets are JSON Schema documents (draft 2020-12) with format
//! assertions enabled, so `occurredAt` must be a real date-time.

use crate::limits::check_limits;
use openpermit_core::effects::{ConformanceEngine, ShapeError, ShapeSource, ValidationOutcome};
use serde_json::Value;

/// Shape set shipped with the bridge
pub const BUNDLED_SHAPES: &str = include_str!("../shapes/permit-event.schema.json");

/// Compiled shape set
pub struct CompiledShapes {
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for CompiledShapes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledShapes").finish_non_exhaustive()
    }
}

/// Conformance engine backed by the `jsonschema` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaEngine;

impl JsonSchemaEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }

    fn compile(schema: &Value) -> Result<CompiledShapes, ShapeError> {
        let validator = jsonschema::options()
            .with_draft(jsonschema::Draft::Draft202012)
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| ShapeError::Invalid(e.to_string()))?;
        Ok(CompiledShapes { validator })
    }
}

impl ConformanceEngine for JsonSchemaEngine {
    type ShapeSet = CompiledShapes;

    fn load(&self, source: &ShapeSource) -> Result<CompiledShapes, ShapeError> {
        let schema = match source {
            ShapeSource::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ShapeError::Unreadable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                serde_json::from_str(&raw).map_err(|e| ShapeError::Unreadable {
                    path: path.clone(),
                    reason: format!("not JSON: {e}"),
                })?
            }
            ShapeSource::Inline(schema) => schema.clone(),
            ShapeSource::Bundled => serde_json::from_str(BUNDLED_SHAPES)
                .map_err(|e| ShapeError::Invalid(format!("bundled shape set: {e}")))?,
        };
        Self::compile(&schema)
    }

    fn check(&self, document: &Value, shapes: &CompiledShapes) -> ValidationOutcome {
        if let Some(diagnostic) = check_limits(document) {
            return ValidationOutcome::violation(diagnostic);
        }

        let diagnostics: Vec<String> = shapes
            .validator
            .iter_errors(document)
            .map(|error| {
                let path = error.instance_path.to_string();
                format!("${path}: {error}")
            })
            .collect();

        if diagnostics.is_empty() {
            ValidationOutcome::conforming()
        } else {
            ValidationOutcome::violation(diagnostics.join("\n"))
        }
    }
}
