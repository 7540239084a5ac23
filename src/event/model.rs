use std::fmt;

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};

use crate::message::model::Message;
use crate::{conversation, message, user};

/// Change-feed addressing.
///
/// `ConversationList` is the multiplexed list-level channel (conversation
/// inserts/updates, participant updates, message inserts, follow changes);
/// `ConversationMessages` scopes message insert/delete to one conversation.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Topic {
    ConversationList,
    ConversationMessages(conversation::Id),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationList => write!(f, "conversations"),
            Self::ConversationMessages(id) => write!(f, "messages:{id}"),
        }
    }
}

/// Presence channel key for a conversation's typing indicator.
pub fn typing_channel(id: &conversation::Id) -> String {
    format!("typing:{id}")
}

/// A row-level notification from the change feed, narrowed into a tagged
/// variant at the subscription boundary. Malformed payloads are dropped
/// there and never reach a store.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    ConversationUpserted {
        id: conversation::Id,
    },
    ParticipantUpdated {
        conversation_id: conversation::Id,
        sub: user::Sub,
    },
    MessageInserted {
        message: Message,
    },
    MessageDeleted {
        conversation_id: conversation::Id,
        id: message::Id,
    },
    FollowChanged {
        follower: user::Sub,
        followee: user::Sub,
        removed: bool,
    },
}

impl ChangeEvent {
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Self>(payload) {
            Ok(ev) => Some(ev),
            Err(e) => {
                error!("failed to deserialize change event: {e:?}");
                None
            }
        }
    }

    pub fn conversation_id(&self) -> Option<&conversation::Id> {
        match self {
            Self::ConversationUpserted { id } => Some(id),
            Self::ParticipantUpdated {
                conversation_id, ..
            } => Some(conversation_id),
            Self::MessageInserted { message } => Some(&message.conversation_id),
            Self::MessageDeleted {
                conversation_id, ..
            } => Some(conversation_id),
            Self::FollowChanged { .. } => None,
        }
    }
}

/// Cross-store notifications that are not carried by the change feed.
/// They travel over the typed [`super::EventBus`] so stores in the same
/// process converge without a server round-trip.
#[derive(Clone, Debug)]
pub enum AppEvent {
    MessagesRead {
        conversation_id: conversation::Id,
        read_at: DateTime<Utc>,
    },
    MessageDeleted {
        conversation_id: conversation::Id,
        message_id: message::Id,
    },
}
