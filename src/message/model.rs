use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation;
use crate::user::{Sub, UserInfo};

use super::{Id, Kind};

/// One message row. `created_at` is immutable and defines the total order
/// within a conversation; `id` is the sole deduplication key at every merge
/// point.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: Id,
    pub conversation_id: conversation::Id,
    /// `None` for system messages.
    pub owner: Option<Sub>,
    pub content: String,
    pub kind: Kind,
    #[serde(default)]
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Denormalized profile of the sender; absent for self-authored messages,
    /// which are rendered without sender decoration downstream.
    pub sender: Option<UserInfo>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn new(conversation_id: conversation::Id, owner: Sub, content: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Id::random(),
            conversation_id,
            owner: Some(owner),
            content: content.to_string(),
            kind: Kind::Text,
            edited: false,
            created_at: now,
            updated_at: now,
            sender: None,
            reactions: Vec::new(),
        }
    }

    pub fn with_sender(self, sender: UserInfo) -> Self {
        Self {
            sender: Some(sender),
            ..self
        }
    }

    /// (message, user, emoji) is conceptually unique: a second reaction from
    /// the same pair replaces the existing row instead of duplicating it.
    pub fn upsert_reaction(&mut self, reaction: Reaction) {
        self.reactions
            .retain(|r| !(r.owner == reaction.owner && r.emoji == reaction.emoji));
        self.reactions.push(reaction);
    }

    pub fn remove_reaction(&mut self, owner: &Sub, emoji: &str) {
        self.reactions
            .retain(|r| !(r.owner == *owner && r.emoji == emoji));
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Id,
    pub owner: Sub,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(message_id: Id, owner: Sub, emoji: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id,
            owner,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Cursor query over a conversation's history. `before` and `after` are
/// exclusive `created_at` bounds; results come back ascending.
#[derive(Clone, Debug)]
pub struct MessageQuery {
    pub limit: usize,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
}

impl MessageQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            before: None,
            after: None,
        }
    }

    pub fn before(cursor: DateTime<Utc>, limit: usize) -> Self {
        Self {
            limit,
            before: Some(cursor),
            after: None,
        }
    }

    pub fn after(cursor: DateTime<Utc>, limit: usize) -> Self {
        Self {
            limit,
            before: None,
            after: Some(cursor),
        }
    }
}

/// State exposed by a [`super::MessageStore`]: the ordered history of one
/// conversation plus paging flags.
#[derive(Clone, Debug, Default)]
pub struct HistorySnapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub has_more: bool,
    pub error: Option<String>,
}

impl HistorySnapshot {
    pub fn contains(&self, id: &Id) -> bool {
        self.messages.iter().any(|m| m.id == *id)
    }

    pub fn newest_at(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.created_at)
    }

    pub fn oldest_at(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.created_at)
    }
}
