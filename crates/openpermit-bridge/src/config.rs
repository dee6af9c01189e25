//! Bridge Configuration
//!
//! Configuration for the permit bridge: homeserver endpoint, bot identity and
//! credentials, room alias derivation, default participants, shape set
//! location and sync loop behavior. Loadable from TOML or from the process
//! environment.

use crate::room::room_alias_for;
use openpermit_core::effects::ShapeSource;
use openpermit_core::{BridgeError, PermitId, Result, RoomAlias, UserId};
use openpermit_transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Homeserver used when none is configured
pub const DEFAULT_HOMESERVER: &str = "http://localhost:6167";

/// Alias prefix used when none is configured
pub const DEFAULT_ROOM_PREFIX: &str = "openpermit";

/// Alias server part used when none is configured
pub const DEFAULT_ALIAS_SERVER: &str = "openpermit";

fn default_homeserver() -> String {
    DEFAULT_HOMESERVER.to_string()
}

fn default_room_prefix() -> String {
    DEFAULT_ROOM_PREFIX.to_string()
}

fn default_alias_server() -> String {
    DEFAULT_ALIAS_SERVER.to_string()
}

fn default_poll_timeout_ms() -> u64 {
    30_000
}

/// Bridge configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Homeserver base URL
    #[serde(default = "default_homeserver")]
    pub homeserver: String,

    /// User the bridge acts as
    pub user_id: UserId,

    /// Pre-issued access token; preferred over the password when both are set
    #[serde(default)]
    pub access_token: Option<String>,

    /// Account password
    #[serde(default)]
    pub password: Option<String>,

    /// Device to log in as
    #[serde(default)]
    pub device_id: Option<String>,

    /// Prefix of every permit room alias
    #[serde(default = "default_room_prefix")]
    pub room_alias_prefix: String,

    /// Server part of every permit room alias
    #[serde(default = "default_alias_server")]
    pub alias_server: String,

    /// Users invited to every permit room
    #[serde(default)]
    pub default_participants: BTreeSet<UserId>,

    /// Shape set file; the bundled shape set is used when absent
    #[serde(default)]
    pub shapes_path: Option<PathBuf>,

    /// Sync loop configuration
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Sync loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Long-poll timeout for each wait, in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Retry behavior for transport failures while polling
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Long-poll timeout as a duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Credential the transport logs in with
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials<'a> {
    /// Pre-issued access token
    AccessToken(&'a str),
    /// Account password
    Password(&'a str),
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

impl BridgeConfig {
    /// Configuration with defaults for everything but identity and credentials
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            homeserver: default_homeserver(),
            user_id: user_id.into(),
            access_token: None,
            password: None,
            device_id: None,
            room_alias_prefix: default_room_prefix(),
            alias_server: default_alias_server(),
            default_participants: BTreeSet::new(),
            shapes_path: None,
            sync: SyncConfig::default(),
        }
    }

    /// Set the access token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a default participant
    pub fn with_participant(mut self, user: impl Into<UserId>) -> Self {
        self.default_participants.insert(user.into());
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| BridgeError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup
    ///
    /// Reads `MATRIX_HOMESERVER`, `MATRIX_USER`, `MATRIX_PASSWORD`,
    /// `MATRIX_ACCESS_TOKEN`, `MATRIX_DEVICE_ID`, `OPENPERMIT_ROOM_PREFIX`,
    /// `OPENPERMIT_ALIAS_SERVER`, `OPENPERMIT_SHAPES` and
    /// `OPENPERMIT_PARTICIPANTS` (comma separated). Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user = var("MATRIX_USER")
            .ok_or_else(|| BridgeError::config("MATRIX_USER is not set"))?;
        let mut config = Self::new(user.trim());

        if let Some(homeserver) = var("MATRIX_HOMESERVER") {
            config.homeserver = homeserver;
        }
        config.access_token = var("MATRIX_ACCESS_TOKEN");
        config.password = var("MATRIX_PASSWORD");
        config.device_id = var("MATRIX_DEVICE_ID");
        if let Some(prefix) = var("OPENPERMIT_ROOM_PREFIX") {
            config.room_alias_prefix = prefix;
        }
        if let Some(server) = var("OPENPERMIT_ALIAS_SERVER") {
            config.alias_server = server;
        }
        config.shapes_path = var("OPENPERMIT_SHAPES").map(PathBuf::from);
        if let Some(participants) = var("OPENPERMIT_PARTICIPANTS") {
            config.default_participants = participants
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(UserId::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.user_id.as_str().trim().is_empty() {
            return Err(BridgeError::config("user_id must not be empty"));
        }
        if self.homeserver.trim().is_empty() {
            return Err(BridgeError::config("homeserver must not be empty"));
        }
        if self.room_alias_prefix.trim().is_empty() {
            return Err(BridgeError::config("room_alias_prefix must not be empty"));
        }
        if self.alias_server.trim().is_empty() || self.alias_server.contains(char::is_whitespace)
        {
            return Err(BridgeError::config(format!(
                "alias_server '{}' is not a server name",
                self.alias_server
            )));
        }
        if self.sync.poll_timeout_ms == 0 {
            return Err(BridgeError::config("sync.poll_timeout_ms must be positive"));
        }
        self.credentials().map(|_| ())
    }

    /// Credential to log in with, token first
    pub fn credentials(&self) -> Result<Credentials<'_>> {
        match (&self.access_token, &self.password) {
            (Some(token), _) => Ok(Credentials::AccessToken(token)),
            (None, Some(password)) => Ok(Credentials::Password(password)),
            (None, None) => Err(BridgeError::config(
                "either access_token or password is required",
            )),
        }
    }

    /// Room alias for a permit under this deployment's prefix and server
    pub fn alias_for_permit(&self, permit_id: &PermitId) -> RoomAlias {
        room_alias_for(&self.room_alias_prefix, &self.alias_server, permit_id)
    }

    /// Default participants merged with `extra`, excluding the bridge user
    pub fn participants(&self, extra: &[UserId]) -> BTreeSet<UserId> {
        self.default_participants
            .iter()
            .chain(extra)
            .filter(|user| **user != self.user_id)
            .cloned()
            .collect()
    }

    /// Where the shape set is loaded from
    pub fn shape_source(&self) -> ShapeSource {
        match &self.shapes_path {
            Some(path) => ShapeSource::File(path.clone()),
            None => ShapeSource::Bundled,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("BridgeConfig")
            .field("homeserver", &self.homeserver)
            .field("user_id", &self.user_id)
            .field("access_token", &redact(&self.access_token))
            .field("password", &redact(&self.password))
            .field("device_id", &self.device_id)
            .field("room_alias_prefix", &self.room_alias_prefix)
            .field("alias_server", &self.alias_server)
            .field("default_participants", &self.default_participants)
            .field("shapes_path", &self.shapes_path)
            .field("sync", &self.sync)
            .finish()
    }
}
