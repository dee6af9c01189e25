//! In-memory homeserver for tests and local runs
//!
//! [`MemoryHomeserver`] keeps rooms, aliases, members and per-user inboxes in
//! one process. Each [`MemoryTransport`] is a logged-in client of it. Clients
//! count their calls and accept injected faults so bridge behavior under
//! transport failure can be asserted without a network.

use async_trait::async_trait;
use openpermit_core::effects::{ChatTransport, RawMessage, RoomVisibility, Session, TransportError};
use openpermit_core::{RoomAlias, RoomHandle, UserId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug)]
struct RoomState {
    name: String,
    visibility: RoomVisibility,
    members: BTreeSet<UserId>,
    invited: BTreeSet<UserId>,
    log: Vec<RawMessage>,
}

#[derive(Debug)]
struct Account {
    access_token: String,
    revoked: bool,
    inbox: VecDeque<RawMessage>,
}

#[derive(Debug, Default)]
struct ServerState {
    rooms: HashMap<RoomHandle, RoomState>,
    aliases: HashMap<String, RoomHandle>,
    accounts: HashMap<UserId, Account>,
}

#[derive(Debug)]
struct Shared {
    server_name: String,
    state: Mutex<ServerState>,
    updates: Notify,
}

/// In-process chat server shared by any number of clients
#[derive(Debug, Clone)]
pub struct MemoryHomeserver {
    shared: Arc<Shared>,
}

impl MemoryHomeserver {
    /// Create an empty homeserver named `server_name`
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                server_name: server_name.into(),
                state: Mutex::new(ServerState::default()),
                updates: Notify::new(),
            }),
        }
    }

    /// Server name used in room handles
    pub fn server_name(&self) -> &str {
        &self.shared.server_name
    }

    /// Register an account that can log in with `access_token`
    pub fn register_user(&self, user_id: impl Into<UserId>, access_token: impl Into<String>) {
        self.shared.state.lock().accounts.insert(
            user_id.into(),
            Account {
                access_token: access_token.into(),
                revoked: false,
                inbox: VecDeque::new(),
            },
        );
    }

    /// Revoke every session of `user_id`; pending long-polls wake up
    pub fn revoke_sessions(&self, user_id: &UserId) {
        if let Some(account) = self.shared.state.lock().accounts.get_mut(user_id) {
            account.revoked = true;
        }
        self.shared.updates.notify_waiters();
    }

    /// Client for `user_id`; call [`ChatTransport::login`] before anything else
    pub fn client(&self, user_id: impl Into<UserId>, access_token: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            server: self.clone(),
            user_id: user_id.into(),
            access_token: access_token.into(),
            logged_in: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(CallCounters::default()),
            faults: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Number of rooms created so far
    pub fn room_count(&self) -> usize {
        self.shared.state.lock().rooms.len()
    }

    /// Room currently bound to `alias`
    pub fn room_for_alias(&self, alias: &RoomAlias) -> Option<RoomHandle> {
        self.shared.state.lock().aliases.get(&alias.to_string()).cloned()
    }

    /// Display name and visibility of a room
    pub fn room_info(&self, room: &RoomHandle) -> Option<(String, RoomVisibility)> {
        self.shared
            .state
            .lock()
            .rooms
            .get(room)
            .map(|r| (r.name.clone(), r.visibility))
    }

    /// Joined members of a room
    pub fn members(&self, room: &RoomHandle) -> BTreeSet<UserId> {
        self.shared
            .state
            .lock()
            .rooms
            .get(room)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    /// Users invited to a room who have not joined yet
    pub fn invited(&self, room: &RoomHandle) -> BTreeSet<UserId> {
        self.shared
            .state
            .lock()
            .rooms
            .get(room)
            .map(|r| r.invited.clone())
            .unwrap_or_default()
    }

    /// Every event posted in a room, oldest first
    pub fn messages(&self, room: &RoomHandle) -> Vec<RawMessage> {
        self.shared
            .state
            .lock()
            .rooms
            .get(room)
            .map(|r| r.log.clone())
            .unwrap_or_default()
    }
}

/// Fault consumed by the next matching client operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFault {
    /// `join_room` reports the alias as unknown even if it exists
    JoinNotFound,
    /// `create_room` is refused with the given reason
    CreateRejected(String),
    /// `send` is refused with the given reason
    SendRejected(String),
    /// `wait_for_updates` times out
    WaitTimeout,
    /// `wait_for_updates` loses the connection
    WaitDisconnected,
}

#[derive(Debug, Default)]
struct CallCounters {
    login: AtomicUsize,
    create_room: AtomicUsize,
    join_room: AtomicUsize,
    invite: AtomicUsize,
    send: AtomicUsize,
    wait_for_updates: AtomicUsize,
}

/// Snapshot of the calls a client has made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSnapshot {
    /// `login` calls
    pub login: usize,
    /// `create_room` calls
    pub create_room: usize,
    /// `join_room` calls
    pub join_room: usize,
    /// `invite` calls
    pub invite: usize,
    /// `send` calls
    pub send: usize,
    /// `wait_for_updates` calls
    pub wait_for_updates: usize,
}

impl CallSnapshot {
    /// Calls that touch rooms or messages (everything except login)
    pub fn room_operations(&self) -> usize {
        self.create_room + self.join_room + self.invite + self.send + self.wait_for_updates
    }
}

/// Client of a [`MemoryHomeserver`]
///
/// Clones share the login state, counters and fault queue.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    server: MemoryHomeserver,
    user_id: UserId,
    access_token: String,
    logged_in: Arc<AtomicBool>,
    calls: Arc<CallCounters>,
    faults: Arc<Mutex<VecDeque<MemoryFault>>>,
}

impl MemoryTransport {
    /// User this client acts as
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue a fault for the next matching operation
    pub fn inject_fault(&self, fault: MemoryFault) {
        self.faults.lock().push_back(fault);
    }

    /// Calls made so far by this client and its clones
    pub fn calls(&self) -> CallSnapshot {
        let c = &self.calls;
        CallSnapshot {
            login: c.login.load(Ordering::SeqCst),
            create_room: c.create_room.load(Ordering::SeqCst),
            join_room: c.join_room.load(Ordering::SeqCst),
            invite: c.invite.load(Ordering::SeqCst),
            send: c.send.load(Ordering::SeqCst),
            wait_for_updates: c.wait_for_updates.load(Ordering::SeqCst),
        }
    }

    fn take_fault(&self, matches: impl Fn(&MemoryFault) -> bool) -> Option<MemoryFault> {
        let mut faults = self.faults.lock();
        let index = faults.iter().position(matches)?;
        faults.remove(index)
    }

    fn check_session(&self, state: &ServerState) -> Result<(), TransportError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            return Err(TransportError::Auth("not logged in".into()));
        }
        match state.accounts.get(&self.user_id) {
            Some(account) if !account.revoked => Ok(()),
            _ => Err(TransportError::Auth("session revoked".into())),
        }
    }

    fn drain_inbox(&self) -> Result<Vec<RawMessage>, TransportError> {
        let mut state = self.server.shared.state.lock();
        self.check_session(&state)?;
        let inbox = state
            .accounts
            .get_mut(&self.user_id)
            .map(|account| account.inbox.drain(..).collect())
            .unwrap_or_default();
        Ok(inbox)
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn login(&self) -> Result<Session, TransportError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        let state = self.server.shared.state.lock();
        match state.accounts.get(&self.user_id) {
            Some(account) if account.access_token == self.access_token && !account.revoked => {
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(Session::new(self.user_id.clone(), None))
            }
            Some(_) => Err(TransportError::Auth(format!(
                "invalid credentials for {}",
                self.user_id
            ))),
            None => Err(TransportError::Auth(format!("unknown user {}", self.user_id))),
        }
    }

    async fn create_room(
        &self,
        alias: &RoomAlias,
        name: &str,
        visibility: RoomVisibility,
    ) -> Result<RoomHandle, TransportError> {
        self.calls.create_room.fetch_add(1, Ordering::SeqCst);
        if let Some(MemoryFault::CreateRejected(reason)) =
            self.take_fault(|f| matches!(f, MemoryFault::CreateRejected(_)))
        {
            return Err(TransportError::Rejected(reason));
        }

        let mut state = self.server.shared.state.lock();
        self.check_session(&state)?;

        let key = alias.to_string();
        if state.aliases.contains_key(&key) {
            return Err(TransportError::AliasTaken { alias: key });
        }

        let handle = RoomHandle::new(format!(
            "!{}:{}",
            Uuid::new_v4().simple(),
            self.server.server_name()
        ));
        state.rooms.insert(
            handle.clone(),
            RoomState {
                name: name.to_string(),
                visibility,
                members: BTreeSet::from([self.user_id.clone()]),
                invited: BTreeSet::new(),
                log: Vec::new(),
            },
        );
        state.aliases.insert(key, handle.clone());
        debug!(alias = %alias, room = %handle, "Memory homeserver created room");
        Ok(handle)
    }

    async fn join_room(&self, alias: &RoomAlias) -> Result<RoomHandle, TransportError> {
        self.calls.join_room.fetch_add(1, Ordering::SeqCst);
        if self
            .take_fault(|f| matches!(f, MemoryFault::JoinNotFound))
            .is_some()
        {
            return Err(TransportError::NotFound {
                alias: alias.to_string(),
            });
        }

        let mut state = self.server.shared.state.lock();
        self.check_session(&state)?;

        let handle = state
            .aliases
            .get(&alias.to_string())
            .cloned()
            .ok_or_else(|| TransportError::NotFound {
                alias: alias.to_string(),
            })?;
        let room = state
            .rooms
            .get_mut(&handle)
            .ok_or_else(|| TransportError::Rejected(format!("room {handle} vanished")))?;

        if room.members.contains(&self.user_id) {
            return Ok(handle);
        }
        if room.visibility == RoomVisibility::Private && !room.invited.remove(&self.user_id) {
            return Err(TransportError::Rejected(format!(
                "{} is not invited to {handle}",
                self.user_id
            )));
        }
        room.members.insert(self.user_id.clone());
        Ok(handle)
    }

    async fn invite(&self, room: &RoomHandle, user: &UserId) -> Result<(), TransportError> {
        self.calls.invite.fetch_add(1, Ordering::SeqCst);
        let mut state = self.server.shared.state.lock();
        self.check_session(&state)?;

        if !state.accounts.contains_key(user) {
            return Err(TransportError::Rejected(format!("unknown user {user}")));
        }
        let target = state
            .rooms
            .get_mut(room)
            .ok_or_else(|| TransportError::Rejected(format!("unknown room {room}")))?;
        if !target.members.contains(&self.user_id) {
            return Err(TransportError::Rejected(format!(
                "{} cannot invite into {room}",
                self.user_id
            )));
        }
        if !target.members.contains(user) {
            target.invited.insert(user.clone());
        }
        Ok(())
    }

    async fn send(
        &self,
        room: &RoomHandle,
        content_type: &str,
        document: &Value,
    ) -> Result<(), TransportError> {
        self.calls.send.fetch_add(1, Ordering::SeqCst);
        if let Some(MemoryFault::SendRejected(reason)) =
            self.take_fault(|f| matches!(f, MemoryFault::SendRejected(_)))
        {
            return Err(TransportError::Rejected(reason));
        }

        {
            let mut state = self.server.shared.state.lock();
            self.check_session(&state)?;

            let message = RawMessage {
                event_id: format!("${}", Uuid::new_v4().simple()),
                room: room.clone(),
                sender: self.user_id.clone(),
                event_type: content_type.to_string(),
                content: document.clone(),
            };

            let target = state
                .rooms
                .get_mut(room)
                .ok_or_else(|| TransportError::Rejected(format!("unknown room {room}")))?;
            if !target.members.contains(&self.user_id) {
                return Err(TransportError::Rejected(format!(
                    "{} is not a member of {room}",
                    self.user_id
                )));
            }
            target.log.push(message.clone());
            let recipients: Vec<UserId> = target
                .members
                .iter()
                .filter(|member| **member != self.user_id)
                .cloned()
                .collect();

            for recipient in recipients {
                if let Some(account) = state.accounts.get_mut(&recipient) {
                    account.inbox.push_back(message.clone());
                }
            }
            trace!(room = %room, event_type = content_type, "Memory homeserver stored event");
        }

        self.server.shared.updates.notify_waiters();
        Ok(())
    }

    async fn wait_for_updates(&self, timeout: Duration) -> Result<Vec<RawMessage>, TransportError> {
        self.calls.wait_for_updates.fetch_add(1, Ordering::SeqCst);
        match self.take_fault(|f| {
            matches!(f, MemoryFault::WaitTimeout | MemoryFault::WaitDisconnected)
        }) {
            Some(MemoryFault::WaitTimeout) => {
                return Err(TransportError::Timeout {
                    operation: "sync".into(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Some(_) => return Err(TransportError::Disconnected("connection reset".into())),
            None => {}
        }

        let notified = self.server.shared.updates.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.drain_inbox()?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        self.drain_inbox()
    }
}
