//! 📣 Events — the "hey, something happened" side channel.
//!
//! 🎬 *[a document lands in the index. somewhere, an auditor wants to know.]*
//!
//! Observers call [`EventBus::subscribe`] and get their own bounded channel.
//! The pipeline calls [`EventBus::publish`] and moves on. It never waits for an
//! observer: a full channel drops the event, a closed channel gets unsubscribed.
//! The pipeline has places to be. 🦆

use std::sync::{Arc, Mutex};

use async_channel::{Receiver, Sender, TrySendError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::common::{CanonicalDocument, UnknownLine};

/// 📦 Per-observer queue depth when nobody configured one.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// 📣 Everything an observer can hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// ✅ One document made it. `response` is the backend's per-item metadata, verbatim.
    Inserted {
        index: String,
        id: Option<String>,
        response: Value,
        document: Box<CanonicalDocument>,
    },
    /// 🚨 The splitter couldn't make a record out of this line.
    UnknownLine(UnknownLine),
    /// 💀 One flush had failures. Published once per flush, not once per document.
    DeliveryFailed { documents: usize, reason: String },
}

/// 📣 Explicit observer registry. Cheap to clone, every clone shares the same observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    observers: Arc<Mutex<Vec<Sender<PipelineEvent>>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// 📻 Tune in. Drop the receiver to tune out.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = async_channel::bounded(self.capacity);
        self.lock_observers().push(tx);
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.lock_observers().len()
    }

    /// 📢 Fan the event out to every live observer without ever blocking.
    pub fn publish(&self, event: PipelineEvent) {
        let mut observers = self.lock_observers();
        observers.retain(|observer| match observer.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("📣 observer queue is full — dropping one event for that observer");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("📣 observer hung up — unsubscribing it");
                false
            }
        });
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<PipelineEvent>>> {
        // -- a panic while holding this lock can't leave the Vec half-edited, so poison is ignorable
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
