//! Identifiers shared across the bridge
//!
//! Permit ids are assigned by the workflow back end and never generated here.
//! Room handles are assigned by the transport. Aliases are derived from
//! permit ids by the room directory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally assigned permit application identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermitId(String);

impl PermitId {
    /// Wrap a permit identifier as issued by the workflow back end
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PermitId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Transport user identifier (e.g. `@inspector:openpermit`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a transport user identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Opaque transport-assigned room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomHandle(String);

impl RoomHandle {
    /// Wrap a room identifier returned by the transport
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-addressable room alias, `#<localpart>:<server>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomAlias {
    localpart: String,
    server: String,
}

impl RoomAlias {
    /// Build an alias from an already sanitised local part and a server name
    pub fn new(localpart: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            localpart: localpart.into(),
            server: server.into(),
        }
    }

    /// Local part used when creating the room
    pub fn localpart(&self) -> &str {
        &self.localpart
    }

    /// Server part of the alias
    pub fn server(&self) -> &str {
        &self.server
    }
}

impl fmt::Display for RoomAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.localpart, self.server)
    }
}
