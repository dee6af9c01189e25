//! Schema validator adapter
//!
//! Binds a conformance engine to one shape set, loaded once at construction.
//! The shape set is never reloaded for the adapter's lifetime.

use crate::engine::JsonSchemaEngine;
use openpermit_core::effects::{
    ConformanceEngine, DocumentValidator, ShapeError, ShapeSource, ValidationOutcome,
};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Validator over a fixed shape set
pub struct SchemaValidator<E: ConformanceEngine = JsonSchemaEngine> {
    engine: E,
    shapes: E::ShapeSet,
    source: String,
}

impl<E: ConformanceEngine> SchemaValidator<E> {
    /// Load `source` with `engine`
    pub fn load(engine: E, source: ShapeSource) -> Result<Self, ShapeError> {
        let label = match &source {
            ShapeSource::File(path) => path.display().to_string(),
            ShapeSource::Inline(_) => "inline".to_string(),
            ShapeSource::Bundled => "bundled".to_string(),
        };
        let shapes = engine.load(&source)?;
        info!(source = %label, "Loaded shape set");
        Ok(Self {
            engine,
            shapes,
            source: label,
        })
    }

    /// Where the shape set was loaded from
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl SchemaValidator<JsonSchemaEngine> {
    /// Load a JSON Schema shape set from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ShapeError> {
        Self::load(
            JsonSchemaEngine::new(),
            ShapeSource::File(path.as_ref().to_path_buf()),
        )
    }

    /// Compile an in-memory JSON Schema shape set
    pub fn from_schema(schema: Value) -> Result<Self, ShapeError> {
        Self::load(JsonSchemaEngine::new(), ShapeSource::Inline(schema))
    }

    /// Load the shape set shipped with the bridge
    pub fn bundled() -> Result<Self, ShapeError> {
        Self::load(JsonSchemaEngine::new(), ShapeSource::Bundled)
    }
}

impl<E: ConformanceEngine> DocumentValidator for SchemaValidator<E> {
    fn validate(&self, document: &Value) -> ValidationOutcome {
        let outcome = self.engine.check(document, &self.shapes);
        if !outcome.conforms {
            debug!(source = %self.source, diagnostics = %outcome.diagnostics, "Document failed shape validation");
        }
        outcome
    }
}

impl<E: ConformanceEngine> std::fmt::Debug for SchemaValidator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use openpermit_core::{build_event, EventOptions, Payload, PermitId};
    use serde_json::json;
    use std::io::Write;

    fn required_permit_and_payload() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["permitId", "payload"],
            "properties": {
                "permitId": { "type": "string" },
                "payload": { "type": "object" }
            }
        })
    }

    #[test]
    fn built_submission_conforms() {
        let validator = SchemaValidator::from_schema(required_permit_and_payload()).unwrap();
        let mut payload = Payload::new();
        payload.insert("submissionPath".into(), json!("submissions/PERMIT-123.json"));
        let event = build_event(
            &PermitId::new("PERMIT-123"),
            "submission",
            payload,
            EventOptions::default()
                .with_status("received")
                .with_actor("alice"),
        )
        .unwrap();

        let outcome = validator.validate(&event.to_document());
        assert!(outcome.conforms, "{}", outcome.diagnostics);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn missing_permit_id_is_reported() {
        let validator = SchemaValidator::from_schema(required_permit_and_payload()).unwrap();
        let doc = json!({
            "@context": "https://openpermit.io/ontology",
            "@type": "https://openpermit.io/ontology#PermitSubmission",
            "payload": {}
        });

        let outcome = validator.validate(&doc);
        assert!(!outcome.conforms);
        assert!(outcome.diagnostics.contains("permitId"), "{}", outcome.diagnostics);
    }

    #[test]
    fn validation_is_deterministic() {
        let validator = SchemaValidator::bundled().unwrap();
        let doc = json!({ "@type": "PermitStatus", "payload": 3 });
        assert_eq!(validator.validate(&doc), validator.validate(&doc));
    }

    #[test]
    fn bundled_shapes_accept_every_built_event_kind() {
        let validator = SchemaValidator::bundled().unwrap();
        for kind in ["submission", "status-update", "approval", "inspection"] {
            let event = build_event(
                &PermitId::new("PERMIT-5"),
                kind,
                Payload::new(),
                EventOptions::default().with_status("open"),
            )
            .unwrap();
            let outcome = validator.validate(&event.to_document());
            assert!(outcome.conforms, "{kind}: {}", outcome.diagnostics);
        }
    }

    #[test]
    fn bundled_shapes_check_inspection_media_payload() {
        let validator = SchemaValidator::bundled().unwrap();
        let mut payload = Payload::new();
        payload.insert("mediaPath".into(), json!("media/site.jpg"));
        payload.insert("location".into(), json!({ "lat": 123.0, "lon": 8.5 }));
        let event = build_event(
            &PermitId::new("PERMIT-5"),
            "inspection-media",
            payload,
            EventOptions::default(),
        )
        .unwrap();

        let outcome = validator.validate(&event.to_document());
        assert!(!outcome.conforms);
        assert!(outcome.diagnostics.contains("/payload/location/lat"), "{}", outcome.diagnostics);
    }

    #[test]
    fn bundled_shapes_check_media_identified_by_type_alone() {
        let validator = SchemaValidator::bundled().unwrap();
        for discriminator in [
            "https://openpermit.io/ontology#InspectionMedia",
            "InspectionMedia",
            "inspection-media",
        ] {
            let doc = json!({
                "@type": discriminator,
                "permitId": "PERMIT-5",
                "occurredAt": "2024-06-03T09:30:00.000Z",
                "payload": {
                    "mediaPath": "media/site.jpg",
                    "location": { "lat": 500, "lon": 900 }
                }
            });
            let outcome = validator.validate(&doc);
            assert!(!outcome.conforms, "{discriminator} accepted");
            assert!(outcome.diagnostics.contains("/payload/location/lat"), "{}", outcome.diagnostics);
        }
    }

    #[test]
    fn bundled_shapes_range_check_numeric_string_coordinates() {
        let validator = SchemaValidator::bundled().unwrap();
        let doc = |location: Value| {
            json!({
                "@type": "InspectionMedia",
                "permitId": "PERMIT-5",
                "occurredAt": "2024-06-03T09:30:00.000Z",
                "payload": { "mediaPath": "media/site.jpg", "location": location }
            })
        };

        assert!(validator.validate(&doc(json!({"latitude": "47.61", "longitude": "-122.33"}))).conforms);
        assert!(validator.validate(&doc(json!({"lat": "-90", "lon": "180.0"}))).conforms);
        assert!(!validator.validate(&doc(json!({"latitude": "91.5", "longitude": "0"}))).conforms);
        assert!(!validator.validate(&doc(json!({"lat": "10", "lon": "181"}))).conforms);
        assert!(!validator.validate(&doc(json!({"lat": "north", "lon": "0"}))).conforms);
    }

    #[test]
    fn bundled_shapes_require_date_time() {
        let validator = SchemaValidator::bundled().unwrap();
        let doc = json!({
            "@type": "PermitStatus",
            "permitId": "PERMIT-5",
            "occurredAt": "last tuesday",
            "payload": {}
        });
        assert!(!validator.validate(&doc).conforms);
    }

    #[test]
    fn loads_shape_set_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", required_permit_and_payload()).unwrap();

        let validator = SchemaValidator::from_path(file.path()).unwrap();
        assert!(validator.validate(&json!({"permitId": "P", "payload": {}})).conforms);
        assert_eq!(validator.source(), file.path().display().to_string());
    }

    #[test]
    fn unreadable_and_invalid_shape_sets_fail_to_load() {
        assert_matches!(
            SchemaValidator::from_path("/nonexistent/shapes.json"),
            Err(ShapeError::Unreadable { .. })
        );
        assert_matches!(
            SchemaValidator::from_schema(json!({
                "type": "object",
                "properties": { "permitId": { "pattern": "(unclosed" } }
            })),
            Err(ShapeError::Invalid(_))
        );
    }
}
