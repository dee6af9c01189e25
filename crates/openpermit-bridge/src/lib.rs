//! # OpenPermit Bridge
//!
//! Keeps one private chat room per permit application and moves permit
//! events between the workflow and those rooms.
//!
//! - [`config`]: deployment configuration from TOML or the environment
//! - [`room`]: permit → room alias derivation and the [`RoomDirectory`]
//! - [`bridge`]: the [`PermitBridge`] outbound and inbound pipelines
//! - [`inbound`]: inbound message kinds and dispatch outcomes
//! - [`sync`]: the long-poll [`SyncLoop`] and its stop signal
//! - [`service`]: [`PermitService`], the operations workflow code calls

#![forbid(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod inbound;
pub mod room;
pub mod service;
pub mod sync;

pub use bridge::{MediaShare, OutboundEvent, PermitBridge};
pub use config::{BridgeConfig, Credentials, SyncConfig};
pub use inbound::{DispatchAction, DropReason, InboundMessage, InboundOutcome};
pub use room::{room_alias_for, InviteReport, RoomDirectory, RoomResolution};
pub use service::{payload_from, PermitParticipant, PermitService};
pub use sync::{DispatchStats, InboundDispatcher, StopHandle, StopSignal, SyncLoop, SyncStats};
