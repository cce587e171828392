/// Push notifications from the engine to its shell.
///
/// Each subscriber gets its own bounded channel. Events are sent with
/// `try_send`: a subscriber that stops draining its receiver loses events
/// rather than stalling a scan, and one that dropped its receiver is
/// removed on the next publish.
use crate::error::Failure;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Queue depth per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A walk of `path_key` began (not emitted for cache hits or joins).
    ScanStarted { path_key: String },
    ScanCompleted {
        path_key: String,
        size_bytes: u64,
        duration: Duration,
    },
    ScanFailed { path_key: String, failure: Failure },
    Deleted { path_key: String, success: bool },
    VolumesRefreshed { count: usize, degraded: bool },
}

#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("event subscriber is lagging; dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
