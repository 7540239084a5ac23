use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message;
use crate::user::{Sub, UserInfo};

use super::{Id, Kind};

/// One row of the requesting user's conversation list. `unread_count` and
/// `is_void` are computed server-side for that user.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    pub id: Id,
    pub kind: Kind,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_void: bool,
}

/// Membership row; exactly one per (conversation, user). `last_read_at` only
/// ever advances.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Participant {
    pub sub: Sub,
    pub last_read_at: Option<DateTime<Utc>>,
    pub user: Option<UserInfo>,
}

/// Denormalized preview of the newest message, as the list view shows it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LastMessage {
    pub id: message::Id,
    pub owner: Option<Sub>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Wire shape of `GET /api/messages/conversations`: the active list plus the
/// archived ("void") partition.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLists {
    pub conversations: Vec<Conversation>,
    pub void_conversations: Vec<Conversation>,
}

/// State exposed by the list synchronizer. On fetch failure the previous
/// partitions are kept; only `error` changes.
#[derive(Clone, Debug, Default)]
pub struct ListSnapshot {
    pub active: Vec<Conversation>,
    pub void: Vec<Conversation>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ListSnapshot {
    pub fn unread_total(&self) -> u32 {
        self.active.iter().map(|c| c.unread_count).sum()
    }

    pub fn void_unread_total(&self) -> u32 {
        self.void.iter().map(|c| c.unread_count).sum()
    }

    pub fn unread_for(&self, id: &Id) -> Option<u32> {
        self.active
            .iter()
            .chain(self.void.iter())
            .find(|c| c.id == *id)
            .map(|c| c.unread_count)
    }

    /// Optimistically zeroes one conversation's unread count in both
    /// partitions.
    pub fn zero_unread(&mut self, id: &Id) {
        for c in self.active.iter_mut().chain(self.void.iter_mut()) {
            if c.id == *id {
                c.unread_count = 0;
            }
        }
    }
}
