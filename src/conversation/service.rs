use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use log::{error, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api;
use crate::debounce::Debouncer;
use crate::event::{self, AppEvent, EventBus, Topic};
use crate::user;

use super::model::ListSnapshot;

const REFRESH_QUIET_WINDOW: Duration = Duration::from_millis(300);

/// Keeps the current user's conversation list (active + void partitions)
/// live for the lifetime of the service.
///
/// Every event on the multiplexed list channel triggers a debounced full
/// refetch instead of fine-grained patching; the list is small and the fetch
/// is cheap. The one synchronous exception is the bus `MessagesRead` event,
/// which zeroes that conversation's unread count immediately.
#[derive(Clone)]
pub struct ConversationService {
    inner: Arc<Inner>,
}

struct Inner {
    api: api::Api,
    feed: event::Feed,
    bus: EventBus,
    state: watch::Sender<ListSnapshot>,
    initialized: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConversationService {
    pub fn new(api: api::Api, feed: event::Feed, bus: EventBus) -> Self {
        let (state, _) = watch::channel(ListSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                api,
                feed,
                bus,
                state,
                initialized: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Performs the initial fetch and attaches the change-feed subscription
    /// and bus listener. Guarded so repeated calls (re-renders of the owning
    /// surface) fetch and subscribe exactly once.
    pub async fn init(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.state.send_modify(|s| s.loading = true);
        self.inner.refetch().await;
        self.inner.attach();
    }

    /// Manual refetch handle. Fetch errors are captured into the snapshot,
    /// never thrown, and the previous list survives them.
    pub async fn refetch(&self) {
        self.inner.refetch().await;
    }

    pub fn snapshot(&self) -> ListSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListSnapshot> {
        self.inner.state.subscribe()
    }

    /// Get-or-create of the direct conversation with `other`. Calling this
    /// twice for the same pair yields the same id; uniqueness is guaranteed
    /// by the collaborator.
    pub async fn find_or_create_chat(&self, other: &user::Sub) -> super::Result<super::Id> {
        let id = self.inner.api.create_conversation(other).await?;
        Ok(id)
    }

    pub fn close(&self) {
        self.inner.abort_tasks();
    }
}

impl Inner {
    async fn refetch(&self) {
        match self.api.find_conversations().await {
            Ok(lists) => self.state.send_modify(|s| {
                s.active = lists.conversations;
                s.void = lists.void_conversations;
                s.loading = false;
                s.error = None;
            }),
            Err(e) => {
                error!("failed to fetch conversations: {e:?}");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    // tasks hold only weak references so dropping the service ends them
    fn attach(self: &Arc<Self>) {
        let feed_task = tokio::spawn(Self::watch_feed(Arc::downgrade(self)));
        let bus_task = tokio::spawn(Self::watch_bus(Arc::downgrade(self)));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(feed_task);
        tasks.push(bus_task);
    }

    async fn watch_feed(weak: Weak<Self>) {
        let Some(feed) = weak.upgrade().map(|inner| inner.feed.clone()) else {
            return;
        };

        let mut stream = match feed.subscribe(Topic::ConversationList).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not subscribe to conversation list feed: {e:?}");
                return;
            }
        };

        let refresher = Debouncer::new(REFRESH_QUIET_WINDOW, {
            let weak = weak.clone();
            move || -> BoxFuture<'static, ()> {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.refetch().await;
                    }
                })
            }
        });

        while stream.next().await.is_some() {
            if weak.upgrade().is_none() {
                break;
            }
            refresher.trigger();
        }
    }

    async fn watch_bus(weak: Weak<Self>) {
        let Some(mut rx) = weak.upgrade().map(|inner| inner.bus.subscribe()) else {
            return;
        };

        loop {
            match rx.recv().await {
                Ok(AppEvent::MessagesRead {
                    conversation_id, ..
                }) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.state.send_modify(|s| s.zero_unread(&conversation_id));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("conversation list lagged {skipped} bus events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
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
        self.abort_tasks();
    }
}
