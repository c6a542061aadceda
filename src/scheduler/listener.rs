//! Progress observers
//!
//! Listeners are kept in a registry keyed by [`ListenerId`] and notified in
//! registration order. Notification iterates over a snapshot of the
//! registry, so a listener may be removed while events are being delivered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Events
// ============================================================================

/// Events emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionEvent {
    /// Run started, paused, resumed, stopped, completed or recovered
    StatusChanged { running: bool, progress: u8 },

    /// Wait armed before request `index` is dispatched
    RequestScheduled {
        delay: Duration,
        index: usize,
        total: usize,
    },
}

impl DistributionEvent {
    /// Deliver this event to a listener
    pub fn deliver(&self, listener: &dyn DistributionListener) {
        match *self {
            Self::StatusChanged { running, progress } => {
                listener.on_status_changed(running, progress)
            }
            Self::RequestScheduled {
                delay,
                index,
                total,
            } => listener.on_request_scheduled(delay, index, total),
        }
    }
}

/// Observer of scheduler status and scheduling
///
/// Callbacks run synchronously on the scheduling context and must not block.
pub trait DistributionListener: Send + Sync {
    fn on_status_changed(&self, _running: bool, _progress: u8) {}

    fn on_request_scheduled(&self, _delay: Duration, _index: usize, _total: usize) {}
}

// ============================================================================
// Registry
// ============================================================================

/// Identifier returned on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Ordered set of listeners
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Arc<dyn DistributionListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&mut self, listener: Arc<dyn DistributionListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, listener);
        id
    }

    /// Unregister a listener; false if it was not registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Listeners in registration order
    pub fn snapshot(&self) -> Vec<Arc<dyn DistributionListener>> {
        self.listeners.values().cloned().collect()
    }

    /// Deliver an event to every listener registered right now
    pub fn emit(&self, event: &DistributionEvent) {
        for listener in self.snapshot() {
            event.deliver(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// Broadcast Adapter
// ============================================================================

/// Listener that republishes events on a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<DistributionEvent>,
}

impl BroadcastListener {
    pub fn new(tx: broadcast::Sender<DistributionEvent>) -> Self {
        Self { tx }
    }

    fn publish(&self, event: DistributionEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl DistributionListener for BroadcastListener {
    fn on_status_changed(&self, running: bool, progress: u8) {
        self.publish(DistributionEvent::StatusChanged { running, progress });
    }

    fn on_request_scheduled(&self, delay: Duration, index: usize, total: usize) {
        self.publish(DistributionEvent::RequestScheduled {
            delay,
            index,
            total,
        });
    }
}
