//! Room Directory
//!
//! One private room per permit, addressed by an alias derived from the permit
//! id. The directory joins the room if it exists, creates it otherwise, caches
//! the handle for the life of the process and invites participants on a
//! best-effort basis.
//!
//! Concurrent first use of the same permit is serialised by a per-permit lock;
//! across processes the transport's alias-taken rejection plus one join retry
//! gives the same outcome.

use crate::config::BridgeConfig;
use openpermit_core::effects::{ChatTransport, RoomVisibility, TransportError};
use openpermit_core::{BridgeError, PermitId, Result, RoomAlias, RoomHandle, UserId};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hex digits of the permit id digest appended to lossy aliases
const DIGEST_SUFFIX_LEN: usize = 8;

/// Separates a lossy alias from its digest; sanitising never produces it
const DIGEST_MARKER: char = '=';

fn is_alias_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Lower-case `raw` and replace every character outside `[a-z0-9._-]` with `-`
///
/// Returns the sanitised text and whether anything was replaced.
fn sanitize(raw: &str) -> (String, bool) {
    let mut replaced = false;
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if is_alias_char(c) {
                c.to_ascii_lowercase()
            } else {
                replaced = true;
                '-'
            }
        })
        .collect();
    (sanitized, replaced)
}

/// Derive the room alias for a permit
///
/// The local part is `<prefix>-<sanitised permit id>`. When sanitising had to
/// replace characters, `=` and the first eight hex digits of the SHA-256 of
/// the lower-cased permit id are appended. Aliases without the marker are
/// exact lower-cased ids, so an id made of allowed characters can never take
/// a lossy id's alias. Ids differing only in letter case share a room.
pub fn room_alias_for(prefix: &str, server: &str, permit_id: &PermitId) -> RoomAlias {
    let (prefix, _) = sanitize(prefix);
    let (id, replaced) = sanitize(permit_id.as_str());

    let mut localpart = format!("{prefix}-{id}");
    if replaced {
        let digest = Sha256::digest(permit_id.as_str().to_lowercase().as_bytes());
        let suffix = hex::encode(digest);
        localpart.push(DIGEST_MARKER);
        localpart.push_str(&suffix[..DIGEST_SUFFIX_LEN]);
    }
    RoomAlias::new(localpart, server)
}

/// Outcome of inviting a room's participants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteReport {
    /// Users invited successfully
    pub invited: Vec<UserId>,
    /// Users whose invitation failed, with the transport's reason
    pub failed: Vec<(UserId, TransportError)>,
}

impl InviteReport {
    /// Whether every invitation succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Full result of resolving a permit's room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomResolution {
    /// The permit's room
    pub handle: RoomHandle,
    /// Whether this call created the room
    pub created: bool,
    /// Invitations sent by this call
    pub invites: InviteReport,
}

/// Permit → room mapping backed by a chat transport
pub struct RoomDirectory {
    transport: Arc<dyn ChatTransport>,
    config: BridgeConfig,
    rooms: RwLock<HashMap<PermitId, RoomHandle>>,
    pending: Mutex<HashMap<PermitId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RoomDirectory {
    /// Directory using the alias scheme and participants from `config`
    pub fn new(transport: Arc<dyn ChatTransport>, config: &BridgeConfig) -> Self {
        Self {
            transport,
            config: config.clone(),
            rooms: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Alias of the permit's room
    pub fn alias_for(&self, permit_id: &PermitId) -> RoomAlias {
        self.config.alias_for_permit(permit_id)
    }

    /// Cached handle for a permit, if its room has been resolved
    pub fn known_room(&self, permit_id: &PermitId) -> Option<RoomHandle> {
        self.rooms.read().get(permit_id).cloned()
    }

    /// Number of permits with a cached room
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Whether no room has been resolved yet
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    /// Permits whose room resolution is in flight
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve the permit's room and invite participants
    pub async fn ensure_room(&self, permit_id: &PermitId, extra: &[UserId]) -> Result<RoomHandle> {
        self.resolve_room(permit_id, extra)
            .await
            .map(|resolution| resolution.handle)
    }

    /// Resolve the permit's room, reporting creation and invitation outcomes
    ///
    /// A freshly resolved room gets the default participants plus `extra`;
    /// a cached room only gets `extra`.
    pub async fn resolve_room(
        &self,
        permit_id: &PermitId,
        extra: &[UserId],
    ) -> Result<RoomResolution> {
        if let Some(handle) = self.known_room(permit_id) {
            debug!(permit_id = %permit_id, room = %handle, "Room cache hit");
            let invites = self.invite_all(&handle, self.extra_invitees(extra)).await;
            return Ok(RoomResolution {
                handle,
                created: false,
                invites,
            });
        }

        let lock = self
            .pending
            .lock()
            .entry(permit_id.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(handle) = self.known_room(permit_id) {
            debug!(permit_id = %permit_id, room = %handle, "Room resolved by concurrent caller");
            let invites = self.invite_all(&handle, self.extra_invitees(extra)).await;
            return Ok(RoomResolution {
                handle,
                created: false,
                invites,
            });
        }

        let alias = self.alias_for(permit_id);
        let joined = self.join_or_create(permit_id, &alias).await;
        if let Ok((handle, _)) = &joined {
            self.rooms.write().insert(permit_id.clone(), handle.clone());
        }
        self.pending.lock().remove(permit_id);
        let (handle, created) = joined?;

        let invites = self.invite_all(&handle, self.config.participants(extra)).await;
        Ok(RoomResolution {
            handle,
            created,
            invites,
        })
    }

    async fn join_or_create(
        &self,
        permit_id: &PermitId,
        alias: &RoomAlias,
    ) -> Result<(RoomHandle, bool)> {
        match self.transport.join_room(alias).await {
            Ok(handle) => {
                debug!(permit_id = %permit_id, alias = %alias, room = %handle, "Joined existing permit room");
                return Ok((handle, false));
            }
            Err(TransportError::NotFound { .. }) => {}
            Err(err) => return Err(room_unavailable(permit_id, err)),
        }

        let name = format!("Permit {permit_id}");
        match self
            .transport
            .create_room(alias, &name, RoomVisibility::Private)
            .await
        {
            Ok(handle) => {
                info!(permit_id = %permit_id, alias = %alias, room = %handle, "Created permit room");
                Ok((handle, true))
            }
            Err(TransportError::AliasTaken { .. }) => {
                debug!(permit_id = %permit_id, alias = %alias, "Alias taken during creation, joining instead");
                let handle = self
                    .transport
                    .join_room(alias)
                    .await
                    .map_err(|err| room_unavailable(permit_id, err))?;
                Ok((handle, false))
            }
            Err(err) => Err(room_unavailable(permit_id, err)),
        }
    }

    fn extra_invitees(&self, extra: &[UserId]) -> BTreeSet<UserId> {
        extra
            .iter()
            .filter(|user| **user != self.config.user_id)
            .cloned()
            .collect()
    }

    async fn invite_all(&self, room: &RoomHandle, users: BTreeSet<UserId>) -> InviteReport {
        let mut report = InviteReport::default();
        for user in users {
            match self.transport.invite(room, &user).await {
                Ok(()) => report.invited.push(user),
                Err(err) => {
                    warn!(room = %room, user = %user, error = %err, "Failed to invite participant");
                    report.failed.push((user, err));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for RoomDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomDirectory")
            .field("own_user", &self.config.user_id)
            .field("alias_prefix", &self.config.room_alias_prefix)
            .field("alias_server", &self.config.alias_server)
            .field("rooms", &self.rooms.read().len())
            .finish_non_exhaustive()
    }
}

fn room_unavailable(permit_id: &PermitId, cause: TransportError) -> BridgeError {
    match cause {
        TransportError::Auth(reason) => BridgeError::Auth(reason),
        cause => BridgeError::RoomUnavailable {
            permit_id: permit_id.clone(),
            cause,
        },
    }
}
