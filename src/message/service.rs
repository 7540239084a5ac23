use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, error, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api;
use crate::conversation;
use crate::event::{self, AppEvent, ChangeEvent, EventBus, Topic};
use crate::user::{Sub, UserInfo};

use super::Kind;
use super::model::{HistorySnapshot, Message, MessageQuery};

pub const PAGE_SIZE: usize = 50;

/// The ordered message history of one open conversation.
///
/// A store is scoped to a single conversation id for its whole life;
/// switching conversations means closing this store and opening a new one.
/// Several paths (subscription echo, optimistic send, catch-up fetch) may
/// observe the same server row; every merge point dedupes by id so no id
/// ever appears twice.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<Inner>,
}

struct Inner {
    conversation_id: conversation::Id,
    me: Sub,
    api: api::Api,
    bus: EventBus,
    state: watch::Sender<HistorySnapshot>,
    typing: watch::Sender<Vec<UserInfo>>,
    loading_more: AtomicBool,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageStore {
    /// Loads the newest page and attaches the per-conversation feed
    /// subscription, bus listener and typing presence channel. The initial
    /// fetch error, if any, is captured into the snapshot.
    pub async fn open(
        api: api::Api,
        feed: event::Feed,
        bus: EventBus,
        me: Sub,
        conversation_id: conversation::Id,
    ) -> Self {
        let (state, _) = watch::channel(HistorySnapshot {
            loading: true,
            ..Default::default()
        });
        let (typing, _) = watch::channel(Vec::new());

        let inner = Arc::new(Inner {
            conversation_id,
            me,
            api,
            bus,
            state,
            typing,
            loading_more: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        inner.initial_load().await;
        inner.attach(feed);

        Self { inner }
    }

    pub fn conversation_id(&self) -> &conversation::Id {
        &self.inner.conversation_id
    }

    pub fn history(&self) -> HistorySnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HistorySnapshot> {
        self.inner.state.subscribe()
    }

    pub fn typing_users(&self) -> Vec<UserInfo> {
        self.inner.typing.borrow().clone()
    }

    pub fn subscribe_typing(&self) -> watch::Receiver<Vec<UserInfo>> {
        self.inner.typing.subscribe()
    }

    /// Backward pagination: prepends up to [`PAGE_SIZE`] messages strictly
    /// older than the oldest loaded one. No-op while another page is
    /// loading, when there is nothing more, or before the initial load
    /// produced anything.
    pub async fn load_more(&self) {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let oldest = {
            let snapshot = inner.state.borrow();
            if !snapshot.has_more || snapshot.messages.is_empty() {
                return;
            }
            snapshot.oldest_at()
        };
        let Some(oldest) = oldest else { return };

        if inner.loading_more.swap(true, Ordering::SeqCst) {
            return;
        }

        let query = MessageQuery::before(oldest, PAGE_SIZE);
        match inner.api.find_messages(&inner.conversation_id, &query).await {
            Ok(older) => {
                let has_more = older.len() >= PAGE_SIZE;
                if !inner.closed.load(Ordering::SeqCst) {
                    inner.state.send_modify(|s| {
                        for msg in older.into_iter().rev() {
                            if !s.contains(&msg.id) {
                                s.messages.insert(0, msg);
                            }
                        }
                        s.has_more = has_more;
                        s.error = None;
                    });
                }
            }
            Err(e) => {
                error!("failed to load older messages: {e:?}");
                inner
                    .state
                    .send_modify(|s| s.error = Some(e.to_string()));
            }
        }

        inner.loading_more.store(false, Ordering::SeqCst);
    }

    /// Sends a message and appends the server-confirmed row immediately,
    /// without waiting for the change-feed echo. Self-authored messages carry
    /// no sender decoration.
    pub async fn send(&self, content: &str, kind: Kind) -> super::Result<Message> {
        if content.trim().is_empty() {
            return Err(super::Error::EmptyContent);
        }

        let msg = self
            .inner
            .api
            .send_message(&self.inner.conversation_id, content, kind)
            .await?;

        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.append_if_absent(msg.clone());
        }
        Ok(msg)
    }

    /// Deletes a message and broadcasts the removal so any other store open
    /// on the same conversation drops it too, without its own delete call.
    pub async fn delete(&self, id: &super::Id) -> super::Result<()> {
        self.inner.api.delete_message(id).await?;

        self.inner.remove(id);
        self.inner.bus.publish(AppEvent::MessageDeleted {
            conversation_id: self.inner.conversation_id,
            message_id: *id,
        });
        Ok(())
    }

    pub async fn add_reaction(&self, id: &super::Id, emoji: &str) -> super::Result<()> {
        let reaction = self.inner.api.add_reaction(id, emoji).await?;
        self.inner.patch(id, |msg| msg.upsert_reaction(reaction));
        Ok(())
    }

    /// Removes the current user's reaction, patching locally by the actual
    /// acting user's sub.
    pub async fn remove_reaction(&self, id: &super::Id, emoji: &str) -> super::Result<()> {
        self.inner.api.remove_reaction(id, emoji).await?;

        let me = self.inner.me.clone();
        let emoji = emoji.to_string();
        self.inner
            .patch(id, move |msg| msg.remove_reaction(&me, &emoji));
        Ok(())
    }

    /// Best-effort typing indication; failures never surface.
    pub fn set_typing(&self, is_typing: bool) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.api.set_typing(&inner.conversation_id, is_typing).await {
                debug!("typing indication failed: {e:?}");
            }
        });
    }

    /// Fires the read receipt and, regardless of its outcome, publishes
    /// `MessagesRead` synchronously so unread badges clear without waiting
    /// for a refetch.
    pub fn mark_as_read(&self) {
        self.inner.bus.publish(AppEvent::MessagesRead {
            conversation_id: self.inner.conversation_id,
            read_at: Utc::now(),
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.api.mark_as_read(&inner.conversation_id).await {
                debug!("mark as read failed: {e:?}");
            }
        });
    }

    /// Catch-up fetch for a hidden-to-visible transition: pulls messages
    /// strictly newer than the newest loaded one (or epoch when nothing is
    /// loaded) and appends any the feed did not deliver meanwhile. The
    /// history converges to the server's state within one call.
    pub async fn on_visible(&self) {
        let after = self
            .inner
            .state
            .borrow()
            .newest_at()
            .unwrap_or(DateTime::UNIX_EPOCH);

        let query = MessageQuery::after(after, PAGE_SIZE);
        match self
            .inner
            .api
            .find_messages(&self.inner.conversation_id, &query)
            .await
        {
            Ok(newer) => {
                if !self.inner.closed.load(Ordering::SeqCst) {
                    for msg in newer {
                        self.inner.append_if_absent(msg);
                    }
                }
            }
            // opportunistic reconciliation, not a user action
            Err(e) => warn!("catch-up fetch failed: {e:?}"),
        }
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.abort_tasks();
    }
}

impl Inner {
    async fn initial_load(&self) {
        let query = MessageQuery::latest(PAGE_SIZE);
        match self.api.find_messages(&self.conversation_id, &query).await {
            Ok(messages) => {
                let has_more = messages.len() >= PAGE_SIZE;
                self.state.send_modify(|s| {
                    s.messages = messages;
                    s.has_more = has_more;
                    s.loading = false;
                    s.error = None;
                });
            }
            Err(e) => {
                error!("failed to load messages: {e:?}");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    // tasks hold only weak references so dropping the store ends them
    fn attach(self: &Arc<Self>, feed: event::Feed) {
        let feed_task = tokio::spawn(Self::watch_feed(Arc::downgrade(self), feed.clone()));
        let bus_task = tokio::spawn(Self::watch_bus(Arc::downgrade(self)));
        let typing_task = tokio::spawn(Self::watch_typing(Arc::downgrade(self), feed));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(feed_task);
        tasks.push(bus_task);
        tasks.push(typing_task);
    }

    async fn watch_feed(weak: Weak<Self>, feed: event::Feed) {
        let Some(topic) = weak
            .upgrade()
            .map(|inner| Topic::ConversationMessages(inner.conversation_id))
        else {
            return;
        };

        let mut stream = match feed.subscribe(topic).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not subscribe to message feed: {e:?}");
                return;
            }
        };

        while let Some(event) = stream.next().await {
            let Some(inner) = weak.upgrade() else { break };
            if inner.closed.load(Ordering::SeqCst) {
                break;
            }

            match event {
                ChangeEvent::MessageInserted { message }
                    if message.conversation_id == inner.conversation_id =>
                {
                    // the optimistic self-echo is already present; skip the
                    // profile fetch for it
                    if inner.state.borrow().contains(&message.id) {
                        continue;
                    }
                    let msg = inner.decorate(message).await;
                    if !inner.closed.load(Ordering::SeqCst) {
                        inner.append_if_absent(msg);
                    }
                }
                ChangeEvent::MessageDeleted {
                    conversation_id,
                    id,
                } if conversation_id == inner.conversation_id => {
                    inner.remove(&id);
                }
                _ => {}
            }
        }
    }

    async fn watch_bus(weak: Weak<Self>) {
        let Some(mut rx) = weak.upgrade().map(|inner| inner.bus.subscribe()) else {
            return;
        };

        loop {
            match rx.recv().await {
                Ok(AppEvent::MessageDeleted {
                    conversation_id,
                    message_id,
                }) => {
                    let Some(inner) = weak.upgrade() else { break };
                    // covers a sibling store whose realtime delete event has
                    // not arrived (removal is idempotent, so our own echo is
                    // harmless)
                    if conversation_id == inner.conversation_id {
                        inner.remove(&message_id);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("message store lagged {skipped} bus events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn watch_typing(weak: Weak<Self>, feed: event::Feed) {
        let Some(id) = weak.upgrade().map(|inner| inner.conversation_id) else {
            return;
        };

        let mut stream = match feed.typing(&id).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("could not join typing channel: {e:?}");
                return;
            }
        };

        // last sync wins; every snapshot replaces the previous membership
        while let Some(users) = stream.next().await {
            let Some(inner) = weak.upgrade() else { break };
            if inner.closed.load(Ordering::SeqCst) {
                break;
            }
            inner.typing.send_replace(users);
        }
    }

    async fn decorate(&self, message: Message) -> Message {
        let Some(owner) = message.owner.clone() else {
            return message;
        };
        if owner == self.me {
            return message;
        }

        match self.api.find_user(&owner).await {
            Ok(info) => message.with_sender(info),
            Err(e) => {
                warn!("could not fetch sender profile for {owner}: {e:?}");
                message
            }
        }
    }

    /// Inserts at the position `created_at` dictates, keeping the exposed
    /// sequence monotonically ordered no matter which path delivered the row.
    fn append_if_absent(&self, msg: Message) {
        self.state.send_modify(|s| {
            if s.contains(&msg.id) {
                return;
            }
            let at = s
                .messages
                .iter()
                .rposition(|m| m.created_at <= msg.created_at)
                .map_or(0, |i| i + 1);
            s.messages.insert(at, msg);
        });
    }

    fn remove(&self, id: &super::Id) {
        self.state.send_modify(|s| s.messages.retain(|m| m.id != *id));
    }

    fn patch(&self, id: &super::Id, patch: impl FnOnce(&mut Message)) {
        self.state.send_modify(|s| {
            if let Some(msg) = s.messages.iter_mut().find(|m| m.id == *id) {
                patch(msg);
            }
        });
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.abort_tasks();
    }
}
