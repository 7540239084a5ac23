#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use squad_messaging::api::{self, MessagingApi};
use squad_messaging::conversation::{
    self,
    model::{Conversation, ConversationLists},
};
use squad_messaging::event::{
    self, ChangeEvent, ChangeFeed, EventStream, PresenceStream, Topic,
};
use squad_messaging::message::{
    self,
    model::{Message, MessageQuery, Reaction},
};
use squad_messaging::user::{Sub, UserInfo};

#[derive(Default)]
pub struct Calls {
    pub find_conversations: AtomicUsize,
    pub find_messages: AtomicUsize,
    pub send_message: AtomicUsize,
    pub delete_message: AtomicUsize,
    pub set_typing: AtomicUsize,
    pub mark_as_read: AtomicUsize,
}

/// Scripted in-memory collaborator API. `history` is the server-side message
/// log, ascending by `created_at`.
pub struct FakeApi {
    pub me: Sub,
    pub lists: Mutex<ConversationLists>,
    pub history: Mutex<Vec<Message>>,
    pub direct: Mutex<HashMap<Sub, conversation::Id>>,
    pub fail_conversations: AtomicBool,
    pub calls: Calls,
}

impl FakeApi {
    pub fn new(me: &str) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            me: Sub::from(me),
            lists: Mutex::new(ConversationLists::default()),
            history: Mutex::new(Vec::new()),
            direct: Mutex::new(HashMap::new()),
            fail_conversations: AtomicBool::new(false),
            calls: Calls::default(),
        })
    }

    pub fn set_lists(&self, active: Vec<Conversation>, void: Vec<Conversation>) {
        *self.lists.lock().unwrap() = ConversationLists {
            conversations: active,
            void_conversations: void,
        };
    }

    pub fn push_history(&self, msg: Message) {
        self.history.lock().unwrap().push(msg);
    }
}

#[async_trait]
impl MessagingApi for FakeApi {
    async fn find_conversations(&self) -> api::Result<ConversationLists> {
        self.calls.find_conversations.fetch_add(1, Ordering::SeqCst);
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(api::Error::Status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        Ok(self.lists.lock().unwrap().clone())
    }

    async fn create_conversation(&self, other: &Sub) -> api::Result<conversation::Id> {
        let mut direct = self.direct.lock().unwrap();
        Ok(*direct
            .entry(other.clone())
            .or_insert_with(conversation::Id::random))
    }

    async fn find_messages(
        &self,
        conversation_id: &conversation::Id,
        query: &MessageQuery,
    ) -> api::Result<Vec<Message>> {
        self.calls.find_messages.fetch_add(1, Ordering::SeqCst);

        let history = self.history.lock().unwrap();
        let mut rows: Vec<Message> = history
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();

        if let Some(before) = query.before {
            rows.retain(|m| m.created_at < before);
            if rows.len() > query.limit {
                rows = rows.split_off(rows.len() - query.limit);
            }
        } else if let Some(after) = query.after {
            rows.retain(|m| m.created_at > after);
            rows.truncate(query.limit);
        } else if rows.len() > query.limit {
            rows = rows.split_off(rows.len() - query.limit);
        }

        Ok(rows)
    }

    async fn send_message(
        &self,
        conversation_id: &conversation::Id,
        content: &str,
        _kind: message::Kind,
    ) -> api::Result<Message> {
        self.calls.send_message.fetch_add(1, Ordering::SeqCst);
        let msg = Message::new(*conversation_id, self.me.clone(), content);
        self.history.lock().unwrap().push(msg.clone());
        Ok(msg)
    }

    async fn delete_message(&self, id: &message::Id) -> api::Result<()> {
        self.calls.delete_message.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().retain(|m| m.id != *id);
        Ok(())
    }

    async fn add_reaction(&self, id: &message::Id, emoji: &str) -> api::Result<Reaction> {
        Ok(Reaction::new(*id, self.me.clone(), emoji))
    }

    async fn remove_reaction(&self, _id: &message::Id, _emoji: &str) -> api::Result<()> {
        Ok(())
    }

    async fn set_typing(
        &self,
        _conversation_id: &conversation::Id,
        _is_typing: bool,
    ) -> api::Result<()> {
        self.calls.set_typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_as_read(&self, _conversation_id: &conversation::Id) -> api::Result<()> {
        self.calls.mark_as_read.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_user(&self, sub: &Sub) -> api::Result<UserInfo> {
        Ok(UserInfo::new(sub.clone(), sub.as_str()))
    }
}

/// Hand-driven change feed: tests push events, stores receive them through
/// the normal subscription seam.
pub struct FakeFeed {
    list_tx: broadcast::Sender<ChangeEvent>,
    msg_tx: broadcast::Sender<ChangeEvent>,
    typing_tx: broadcast::Sender<Vec<UserInfo>>,
}

impl FakeFeed {
    pub fn new() -> std::sync::Arc<Self> {
        let (list_tx, _) = broadcast::channel(64);
        let (msg_tx, _) = broadcast::channel(64);
        let (typing_tx, _) = broadcast::channel(64);
        std::sync::Arc::new(Self {
            list_tx,
            msg_tx,
            typing_tx,
        })
    }

    pub fn push_list(&self, event: ChangeEvent) {
        let _ = self.list_tx.send(event);
    }

    pub fn push_message(&self, event: ChangeEvent) {
        let _ = self.msg_tx.send(event);
    }

    pub fn push_typing(&self, users: Vec<UserInfo>) {
        let _ = self.typing_tx.send(users);
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(&self, topic: Topic) -> event::Result<EventStream> {
        let rx = match topic {
            Topic::ConversationList => self.list_tx.subscribe(),
            Topic::ConversationMessages(_) => self.msg_tx.subscribe(),
        };
        Ok(Box::pin(
            BroadcastStream::new(rx).filter_map(|r| async move { r.ok() }),
        ))
    }

    async fn typing(&self, _conversation_id: &conversation::Id) -> event::Result<PresenceStream> {
        Ok(Box::pin(
            BroadcastStream::new(self.typing_tx.subscribe()).filter_map(|r| async move { r.ok() }),
        ))
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn message_at(
    conversation_id: conversation::Id,
    owner: &str,
    content: &str,
    at: DateTime<Utc>,
) -> Message {
    Message {
        id: message::Id::random(),
        conversation_id,
        owner: Some(Sub::from(owner)),
        content: content.to_string(),
        kind: message::Kind::Text,
        edited: false,
        created_at: at,
        updated_at: at,
        sender: None,
        reactions: Vec::new(),
    }
}

pub fn conversation_with_unread(id: conversation::Id, unread: u32) -> Conversation {
    Conversation {
        id,
        kind: conversation::Kind::Direct,
        name: None,
        created_at: base_time(),
        updated_at: base_time(),
        participants: Vec::new(),
        last_message: None,
        unread_count: unread,
        is_void: false,
    }
}
