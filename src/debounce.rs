use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Coalesces bursts of triggers into a single action run.
///
/// Every [`trigger`](Self::trigger) resets the pending timer; the action runs
/// once after the configured quiet window of silence. No arguments are
/// carried, which keeps this a pure rate-limiter for "something changed,
/// refetch everything" callbacks.
pub struct Debouncer {
    delay: Duration,
    action: Action,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            delay,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    pub fn trigger(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(prev) = pending.take() {
            prev.abort();
        }

        let action = self.action.clone();
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
        }));
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(prev) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            prev.abort();
        }
    }
}
