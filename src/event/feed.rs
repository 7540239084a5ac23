use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::conversation;
use crate::user::UserInfo;

use super::model::{ChangeEvent, Topic};

pub type EventStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// Full-membership snapshots of a typing presence channel. There are no
/// incremental join/leave deltas; every item replaces the previous one.
pub type PresenceStream = Pin<Box<dyn Stream<Item = Vec<UserInfo>> + Send>>;

/// The realtime change-feed collaborator.
///
/// The transport (websocket, NATS, ...) lives outside this crate; stores only
/// consume the narrowed streams. Dropping a stream is the teardown.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> super::Result<EventStream>;

    /// Joins the ephemeral `typing:{conversationId}` presence channel.
    async fn typing(&self, conversation_id: &conversation::Id) -> super::Result<PresenceStream>;
}

pub type Feed = Arc<dyn ChangeFeed>;
