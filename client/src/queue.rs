//! Durable FIFO of operations awaiting replay.
//!
//! Wraps the engine's queued-operation types with whole-queue
//! persistence: every mutation rewrites the stored queue under
//! [`QUEUE_KEY`], so a restart while disconnected loses nothing.

use crate::storage::{LocalStorage, QUEUE_KEY};
use crate::Result;
use shelfsync_engine::{decode_queue, encode_queue, OperationId, QueuedOperation};

/// Outcome of one drain pass over the queue.
///
/// Partial success is expected and not an error: the drain always runs
/// to completion and reports which operations made it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations applied to the remote store and removed from the queue
    pub succeeded: Vec<OperationId>,
    /// Operations that stay queued for the next attempt
    pub failed: Vec<OperationId>,
}

impl DrainReport {
    /// True when every drained operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// FIFO of operations that could not reach the remote store.
#[derive(Debug, Default)]
pub struct OfflineQueue {
    ops: Vec<QueuedOperation>,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload the queue from durable storage.
    ///
    /// A corrupt stored queue is logged and treated as empty rather than
    /// failing startup.
    pub fn load(storage: &dyn LocalStorage) -> Result<Self> {
        let ops = match storage.get(QUEUE_KEY)? {
            None => Vec::new(),
            Some(raw) => match decode_queue(&raw) {
                Ok(ops) => ops,
                Err(e) => {
                    tracing::warn!(error = %e, "stored offline queue is corrupt, starting empty");
                    Vec::new()
                }
            },
        };
        Ok(Self { ops })
    }

    /// Write the whole queue back to durable storage.
    pub fn persist(&self, storage: &dyn LocalStorage) -> Result<()> {
        let encoded = encode_queue(&self.ops)?;
        storage.set(QUEUE_KEY, &encoded)
    }

    /// Append an operation.
    pub fn push(&mut self, op: QueuedOperation) {
        self.ops.push(op);
    }

    /// The queued operations in enqueue order.
    pub fn ops(&self) -> &[QueuedOperation] {
        &self.ops
    }

    /// Remove and return every queued operation, leaving the queue empty.
    pub fn take_all(&mut self) -> Vec<QueuedOperation> {
        std::mem::take(&mut self.ops)
    }

    /// Replace the queue contents, typically with the operations a drain
    /// could not apply.
    pub fn replace(&mut self, ops: Vec<QueuedOperation>) {
        self.ops = ops;
    }

    /// Rewrite every reference to a temporary record id after the remote
    /// store assigned the real one. Returns how many operations changed.
    pub fn retarget(&mut self, old_id: &str, new_id: &str) -> usize {
        self.ops
            .iter_mut()
            .map(|op| op.retarget(old_id, new_id))
            .filter(|changed| *changed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
