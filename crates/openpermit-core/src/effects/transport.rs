//! Chat transport capability
//!
//! The bridge talks to the federated chat network only through this trait.
//! Implementations own the wire protocol; the bridge owns room naming,
//! validation and dispatch.

use crate::identifiers::{RoomAlias, RoomHandle, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Transport operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Login rejected, or the session is no longer valid
    #[error("Authentication error: {0}")]
    Auth(String),

    /// No room is known under the alias
    #[error("Room alias not found: {alias}")]
    NotFound {
        /// Alias that was looked up
        alias: String,
    },

    /// Another client already holds the alias
    #[error("Room alias already taken: {alias}")]
    AliasTaken {
        /// Alias that was requested
        alias: String,
    },

    /// Operation did not complete in time
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Connection to the homeserver was lost
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Homeserver refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Timeouts and disconnects; safe to retry from the sync loop
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Disconnected(_))
    }

    /// Authentication loss; the session cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Room visibility requested at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomVisibility {
    /// Invite-only room
    Private,
    /// Listed and joinable by anyone on the server
    Public,
}

/// Evidence of a successful login
///
/// The sync loop takes a `Session` so it cannot be entered unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user
    pub user_id: UserId,
    /// Device the session is bound to, if the server assigned one
    pub device_id: Option<String>,
}

impl Session {
    /// Record a login for `user_id`
    pub fn new(user_id: UserId, device_id: Option<String>) -> Self {
        Self { user_id, device_id }
    }
}

/// A room event as delivered by a sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Transport-assigned event id
    pub event_id: String,
    /// Room the event was posted in
    pub room: RoomHandle,
    /// Sender of the event
    pub sender: UserId,
    /// Event type, e.g. `org.openpermit.event` or `m.room.message`
    pub event_type: String,
    /// Event content
    pub content: Value,
}

/// Capability-based chat client
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Authenticate with the configured credentials
    async fn login(&self) -> Result<Session, TransportError>;

    /// Create a room reachable under `alias`
    async fn create_room(
        &self,
        alias: &RoomAlias,
        name: &str,
        visibility: RoomVisibility,
    ) -> Result<RoomHandle, TransportError>;

    /// Join the room known under `alias`
    async fn join_room(&self, alias: &RoomAlias) -> Result<RoomHandle, TransportError>;

    /// Invite a user into a room
    async fn invite(&self, room: &RoomHandle, user: &UserId) -> Result<(), TransportError>;

    /// Post a structured event into a room
    async fn send(
        &self,
        room: &RoomHandle,
        content_type: &str,
        document: &Value,
    ) -> Result<(), TransportError>;

    /// Long-poll for new room events, returning an empty batch on an idle timeout
    async fn wait_for_updates(&self, timeout: Duration) -> Result<Vec<RawMessage>, TransportError>;
}
