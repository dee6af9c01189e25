//! # OpenPermit Shapes
//!
//! Shape conformance for permit event documents. [`SchemaValidator`] is the
//! adapter the bridge holds; [`JsonSchemaEngine`] is the engine behind it.

#![forbid(unsafe_code)]

pub mod adapter;
pub mod engine;
pub mod limits;

pub use adapter::SchemaValidator;
pub use engine::{CompiledShapes, JsonSchemaEngine, BUNDLED_SHAPES};
