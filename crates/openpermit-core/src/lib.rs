//! # OpenPermit Core
//!
//! Shared vocabulary for the permit chat bridge:
//!
//! - [`identifiers`]: permit ids, user ids, room handles and aliases
//! - [`event`] and [`codec`]: the canonical [`PermitEvent`] and its JSON-LD wire form
//! - [`effects`]: capability traits for the chat transport, shape conformance
//!   and workflow collaborators
//! - [`errors`]: the caller-facing [`BridgeError`] taxonomy
//!
//! Nothing in this crate performs I/O.

#![forbid(unsafe_code)]

pub mod codec;
pub mod effects;
pub mod errors;
pub mod event;
pub mod identifiers;

pub use codec::{
    build_event, build_typed_event, parse_event, EventOptions, EVENT_CONTENT_TYPE,
};
pub use errors::{BridgeError, CodecError, Result};
pub use event::{EventType, Payload, PermitEvent, ONTOLOGY_IRI};
pub use identifiers::{PermitId, RoomAlias, RoomHandle, UserId};
