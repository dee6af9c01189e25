//! Canned shape sets, payloads, raw messages and homeserver setups

use chrono::Utc;
use openpermit_core::effects::RawMessage;
use openpermit_core::{Payload, RoomHandle, UserId, EVENT_CONTENT_TYPE};
use openpermit_transport::{MemoryHomeserver, MemoryTransport};
use serde_json::{json, Value};

/// Server name of test homeservers
pub const SERVER_NAME: &str = "openpermit";

/// User the bridge acts as in tests
pub const BOT_USER: &str = "@permits:openpermit";

/// Access token of [`BOT_USER`]
pub const BOT_TOKEN: &str = "bot-token";

/// Shape set requiring only `permitId` and an object `payload`
pub fn permit_and_payload_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["permitId", "payload"],
        "properties": {
            "permitId": { "type": "string", "minLength": 1 },
            "payload": { "type": "object" }
        }
    })
}

/// Payload from a JSON object literal
///
/// # Panics
/// Panics when `value` is not an object.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload fixture must be an object, got {other}"),
    }
}

/// Wire document for an event sent by another participant
pub fn permit_document(permit_id: &str, event_type: &str, payload: Value) -> Value {
    json!({
        "@context": "https://openpermit.io/ontology",
        "@type": event_type,
        "eventType": event_type,
        "permitId": permit_id,
        "occurredAt": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "payload": payload,
    })
}

/// Raw message as the transport would deliver it
pub fn raw_message(sender: &str, event_type: &str, content: Value) -> RawMessage {
    RawMessage {
        event_id: format!("$test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
        room: RoomHandle::new(format!("!fixture:{SERVER_NAME}")),
        sender: UserId::new(sender),
        event_type: event_type.to_string(),
        content,
    }
}

/// Raw permit event message
pub fn raw_permit_event(sender: &str, document: Value) -> RawMessage {
    raw_message(sender, EVENT_CONTENT_TYPE, document)
}

/// PNG signature, enough for format sniffing
pub const PNG_BYTES: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// Homeserver with the bot and the given users registered
///
/// Each extra user's token is `<localpart>-token`.
pub fn homeserver_with_users(users: &[&str]) -> MemoryHomeserver {
    let server = MemoryHomeserver::new(SERVER_NAME);
    server.register_user(BOT_USER, BOT_TOKEN);
    for user in users {
        server.register_user(*user, user_token(user));
    }
    server
}

/// Token registered for `user` by [`homeserver_with_users`]
pub fn user_token(user: &str) -> String {
    let localpart = user
        .trim_start_matches('@')
        .split(':')
        .next()
        .unwrap_or(user);
    format!("{localpart}-token")
}

/// Bot client of `server`, not yet logged in
pub fn bot_client(server: &MemoryHomeserver) -> MemoryTransport {
    server.client(BOT_USER, BOT_TOKEN)
}

/// Client for a user registered by [`homeserver_with_users`], not yet logged in
pub fn user_client(server: &MemoryHomeserver, user: &str) -> MemoryTransport {
    server.client(user, user_token(user))
}
