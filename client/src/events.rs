//! Sync status event hub.
//!
//! Tracks registered status listeners and fans sync status transitions
//! out to them as they happen.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shelfsync_engine::SyncStatus;
use tokio::sync::mpsc;

/// Sender for status change notifications.
pub type StatusSender = mpsc::UnboundedSender<SyncStatusChange>;

/// A single sync status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusChange {
    /// The status just entered
    pub status: SyncStatus,
    /// Human-readable context for the transition
    pub message: String,
    /// The status just left
    pub previous_status: SyncStatus,
}

/// Manages registered status listeners.
///
/// Thread-safe and can be shared across tasks via `Arc`.
#[derive(Debug, Default)]
pub struct EventHub {
    /// All registered listeners, keyed by listener ID.
    listeners: DashMap<String, StatusSender>,
}

impl EventHub {
    /// Create a new event hub.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }

    /// Register a new listener.
    ///
    /// Returns the listener ID and the receiving end of the channel.
    /// Dropping the receiver is enough; the listener is pruned on the
    /// next emit.
    pub fn register(&self) -> (String, mpsc::UnboundedReceiver<SyncStatusChange>) {
        let listener_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        self.listeners.insert(listener_id.clone(), tx);

        tracing::debug!(listener_id = %listener_id, "status listener registered");

        (listener_id, rx)
    }

    /// Unregister a listener.
    pub fn unregister(&self, listener_id: &str) {
        if self.listeners.remove(listener_id).is_some() {
            tracing::debug!(listener_id = %listener_id, "status listener unregistered");
        }
    }

    /// Broadcast a status change to all listeners.
    ///
    /// Returns the number of listeners that received the change.
    pub fn emit(&self, change: SyncStatusChange) -> usize {
        let mut sent_count = 0;
        let mut dropped = Vec::new();

        for entry in self.listeners.iter() {
            if entry.value().send(change.clone()).is_ok() {
                sent_count += 1;
            } else {
                dropped.push(entry.key().clone());
            }
        }

        for listener_id in dropped {
            self.listeners.remove(&listener_id);
        }

        tracing::debug!(
            status = %change.status,
            recipients = sent_count,
            "sync status broadcast"
        );

        sent_count
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(previous: SyncStatus, status: SyncStatus) -> SyncStatusChange {
        SyncStatusChange {
            status,
            message: String::new(),
            previous_status: previous,
        }
    }

    #[test]
    fn test_register_unregister() {
        let hub = EventHub::new();

        let (listener_id, _rx) = hub.register();
        assert_eq!(hub.listener_count(), 1);

        hub.unregister(&listener_id);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_emit_reaches_all_listeners() {
        let hub = EventHub::new();

        let (_id1, mut rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        let sent = hub.emit(change(SyncStatus::Disconnected, SyncStatus::Connecting));
        assert_eq!(sent, 2);

        assert_eq!(rx1.try_recv().unwrap().status, SyncStatus::Connecting);
        assert_eq!(rx2.try_recv().unwrap().status, SyncStatus::Connecting);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let hub = EventHub::new();

        let (_id1, rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();
        drop(rx1);

        let sent = hub.emit(change(SyncStatus::Connecting, SyncStatus::Connected));
        assert_eq!(sent, 1);
        assert_eq!(hub.listener_count(), 1);

        assert_eq!(rx2.try_recv().unwrap().status, SyncStatus::Connected);
    }
}
