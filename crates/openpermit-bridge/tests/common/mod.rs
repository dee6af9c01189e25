#![allow(dead_code)]

use openpermit_bridge::{BridgeConfig, PermitBridge};
use openpermit_core::effects::{ChatTransport, DocumentValidator, MediaStore, SubmissionUpdater};
use openpermit_shapes::SchemaValidator;
use openpermit_testkit::{
    bot_client, homeserver_with_users, permit_and_payload_schema, RecordingMedia,
    RecordingSubmissions, BOT_TOKEN, BOT_USER,
};
use openpermit_transport::{MemoryHomeserver, MemoryTransport};
use std::sync::Arc;

pub const ALICE: &str = "@alice:openpermit";
pub const BOB: &str = "@bob:openpermit";
pub const CLERK: &str = "@clerk:openpermit";

pub fn config() -> BridgeConfig {
    BridgeConfig::new(BOT_USER).with_access_token(BOT_TOKEN)
}

/// Memory homeserver, logged-in bot and a bridge over recording collaborators
pub struct Harness {
    pub server: MemoryHomeserver,
    pub bot: MemoryTransport,
    pub config: BridgeConfig,
    pub submissions: Arc<RecordingSubmissions>,
    pub media: Arc<RecordingMedia>,
    pub bridge: Arc<PermitBridge>,
}

impl Harness {
    /// Bridge validating against the bundled shape set
    pub async fn bundled() -> Self {
        Self::build(config(), Arc::new(SchemaValidator::bundled().unwrap())).await
    }

    /// Bridge validating against a shape set requiring `permitId` and `payload`
    pub async fn minimal_shapes() -> Self {
        Self::build(
            config(),
            Arc::new(SchemaValidator::from_schema(permit_and_payload_schema()).unwrap()),
        )
        .await
    }

    pub async fn with_validator(validator: Arc<dyn DocumentValidator>) -> Self {
        Self::build(config(), validator).await
    }

    /// Bundled shapes with `media` as the media collaborator
    pub async fn with_media(media: Arc<dyn MediaStore>) -> Self {
        let mut harness = Self::bundled().await;
        harness.bridge = Arc::new(PermitBridge::new(
            &harness.config,
            Arc::new(harness.bot.clone()),
            Arc::new(SchemaValidator::bundled().unwrap()),
            harness.submissions.clone(),
            media,
        ));
        harness
    }

    pub async fn build(config: BridgeConfig, validator: Arc<dyn DocumentValidator>) -> Self {
        let server = homeserver_with_users(&[ALICE, BOB, CLERK]);
        let bot = bot_client(&server);
        bot.login().await.unwrap();

        let submissions = Arc::new(RecordingSubmissions::new());
        let media = Arc::new(RecordingMedia::new());
        let bridge = Arc::new(PermitBridge::new(
            &config,
            Arc::new(bot.clone()),
            validator,
            submissions.clone() as Arc<dyn SubmissionUpdater>,
            media.clone() as Arc<dyn MediaStore>,
        ));

        Self {
            server,
            bot,
            config,
            submissions,
            media,
            bridge,
        }
    }
}
