use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use log::{error, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api;
use crate::conversation;
use crate::debounce::Debouncer;
use crate::event::{self, AppEvent, ChangeEvent, EventBus, Topic};

const RECOMPUTE_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Live total of unread messages across the active conversation list.
///
/// The fetch/subscription loop starts lazily on the first subscriber and then
/// stays up for the service's lifetime; later subscribers share it instead of
/// adding redundant loops. Inject one instance per process.
#[derive(Clone)]
pub struct UnreadService {
    inner: Arc<Inner>,
}

struct Inner {
    api: api::Api,
    feed: event::Feed,
    bus: EventBus,
    count: watch::Sender<u32>,
    /// Per-conversation counts from the last recompute, consulted for the
    /// optimistic decrement on `MessagesRead`.
    per_conversation: Mutex<HashMap<conversation::Id, u32>>,
    subscribers: AtomicUsize,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UnreadService {
    pub fn new(api: api::Api, feed: event::Feed, bus: EventBus) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                api,
                feed,
                bus,
                count,
                per_conversation: Mutex::new(HashMap::new()),
                subscribers: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers a consumer. The returned handle observes the last-known
    /// count immediately, with no flash of zero while the first fetch is in
    /// flight on later mounts.
    pub fn subscribe(&self) -> UnreadHandle {
        self.inner.subscribers.fetch_add(1, Ordering::SeqCst);
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            self.inner.start();
        }

        UnreadHandle {
            rx: self.inner.count.subscribe(),
            registration: Some(self.inner.clone()),
        }
    }

    /// Disabled consumers always report zero and register nothing.
    pub fn subscribe_if(&self, enabled: bool) -> UnreadHandle {
        if enabled {
            return self.subscribe();
        }

        let (_, rx) = watch::channel(0);
        UnreadHandle {
            rx,
            registration: None,
        }
    }

    pub fn count(&self) -> u32 {
        *self.inner.count.borrow()
    }

    pub fn shutdown(&self) {
        self.inner.abort_tasks();
    }
}

/// Consumer registration; dropping it deregisters the consumer. The shared
/// loop intentionally outlives the last handle.
pub struct UnreadHandle {
    rx: watch::Receiver<u32>,
    registration: Option<Arc<Inner>>,
}

impl UnreadHandle {
    pub fn count(&self) -> u32 {
        *self.rx.borrow()
    }

    pub fn receiver(&mut self) -> &mut watch::Receiver<u32> {
        &mut self.rx
    }
}

impl Drop for UnreadHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.registration.take() {
            inner.subscribers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Inner {
    // tasks hold only weak references; the loop runs while the service or
    // any handle is alive, never longer
    fn start(self: &Arc<Self>) {
        let initial = tokio::spawn({
            let weak = Arc::downgrade(self);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.recompute().await;
                }
            }
        });
        let feed_task = tokio::spawn(Self::watch_feed(Arc::downgrade(self)));
        let bus_task = tokio::spawn(Self::watch_bus(Arc::downgrade(self)));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(initial);
        tasks.push(feed_task);
        tasks.push(bus_task);
    }

    /// Recomputes the total as the sum of `unread_count` over the active
    /// conversation list and pushes it to every listener.
    async fn recompute(&self) {
        match self.api.find_conversations().await {
            Ok(lists) => {
                let mut counts = HashMap::new();
                let mut total = 0u32;
                for c in &lists.conversations {
                    counts.insert(c.id, c.unread_count);
                    total += c.unread_count;
                }

                *self
                    .per_conversation
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = counts;
                self.count.send_replace(total);
            }
            // keep the last-known value on failure
            Err(e) => error!("failed to recompute unread count: {e:?}"),
        }
    }

    async fn watch_feed(weak: Weak<Self>) {
        let Some(feed) = weak.upgrade().map(|inner| inner.feed.clone()) else {
            return;
        };

        let mut stream = match feed.subscribe(Topic::ConversationList).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not subscribe unread counter to feed: {e:?}");
                return;
            }
        };

        let recompute = Debouncer::new(RECOMPUTE_QUIET_WINDOW, {
            let weak = weak.clone();
            move || -> BoxFuture<'static, ()> {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.recompute().await;
                    }
                })
            }
        });

        while let Some(event) = stream.next().await {
            if weak.upgrade().is_none() {
                break;
            }
            if matches!(
                event,
                ChangeEvent::MessageInserted { .. } | ChangeEvent::ParticipantUpdated { .. }
            ) {
                recompute.trigger();
            }
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
                    inner.on_read(&conversation_id);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("unread counter lagged {skipped} bus events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Optimistic decrement, clamped at zero: subtracts the conversation's
    /// count from the last recompute without waiting on a round-trip.
    fn on_read(&self, conversation_id: &conversation::Id) {
        let delta = self
            .per_conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id)
            .unwrap_or(1);

        self.count.send_modify(|c| *c = c.saturating_sub(delta));
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
