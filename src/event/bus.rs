use log::debug;
use tokio::sync::broadcast;

use super::model::AppEvent;

const BUS_CAPACITY: usize = 64;

/// Process-wide pub/sub for [`AppEvent`]s.
///
/// One bus is shared by every store in a process; publishing with no
/// subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            debug!("app event published without subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
