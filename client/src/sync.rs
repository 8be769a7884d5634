//! Connectivity state machine, offline queue drain, and remote write
//! path.
//!
//! Everything here runs with the client mutex held, including across
//! remote calls; that is what guarantees per-target replay ordering and
//! keeps the mirrors, the queue, and the remote store moving in
//! lockstep.

use crate::client::{now_ms, ClientInner, ClientState};
use crate::queue::DrainReport;
use crate::{ClientError, Result};
use serde_json::Value;
use shelfsync_engine::{
    default_categories, modified_at, resolve, Book, Category, OperationKind, QueuedOperation,
    Resolution, SyncStatus, TargetCollection, Timestamp, UNCATEGORIZED_ID,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// One elementary remote effect of a user-level operation.
///
/// Compound operations (renames, reparents, cascading deletes) expand
/// into an ordered list of these; the commit path either applies them to
/// the remote store directly or queues them for replay.
pub(crate) enum WriteOp {
    Add {
        collection: TargetCollection,
        record_id: String,
        record: Value,
    },
    Update {
        collection: TargetCollection,
        record_id: String,
        patch: Value,
    },
    Delete {
        collection: TargetCollection,
        record_id: String,
    },
}

// ==================== connectivity ====================

impl ClientInner {
    /// Probe the remote store and, on success, refresh the mirrors and
    /// drain the offline queue. Any failure lands in the error state
    /// with a retry armed.
    pub(crate) async fn attempt_connect(self: &Arc<Self>, state: &mut ClientState) {
        self.set_status(state, SyncStatus::Connecting, "connecting to remote store");

        if let Err(e) = self.remote.ping().await {
            tracing::warn!(error = %e, "liveness probe failed");
            self.enter_error(state, "could not reach remote store");
            return;
        }

        self.cancel_retry(state);
        state.sync.retry_count = 0;
        self.set_status(state, SyncStatus::Connected, "connected to remote store");

        match self.refresh_from_remote(state).await {
            Ok(()) => {
                let _ = self.run_drain(state).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial remote load failed");
                self.enter_error(state, "remote load failed");
            }
        }
    }

    /// Move to the error state and arm the next reconnect attempt.
    pub(crate) fn enter_error(self: &Arc<Self>, state: &mut ClientState, message: &str) {
        self.set_status(state, SyncStatus::Error, message);
        self.schedule_retry(state);
    }

    /// Arm a reconnect timer using the exponential backoff policy. A
    /// timer already armed is cleared first, so at most one is pending.
    fn schedule_retry(self: &Arc<Self>, state: &mut ClientState) {
        self.cancel_retry(state);

        let attempt = state.sync.retry_count;
        let Some(delay) = self.config.backoff.delay_ms(attempt) else {
            tracing::warn!(
                attempts = attempt,
                "retry attempts exhausted, waiting for a network signal"
            );
            return;
        };
        state.sync.retry_count = attempt + 1;

        tracing::info!(attempt = attempt + 1, delay_ms = delay, "reconnect scheduled");

        let epoch = state.epoch;
        let inner = Arc::clone(self);
        state.retry = Some(tokio::spawn(async move {
            time::sleep(Duration::from_millis(delay)).await;
            inner.retry_fire(epoch).await;
        }));
    }

    async fn retry_fire(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            tracing::debug!("discarding reconnect attempt from a superseded epoch");
            return;
        }
        // This attempt is the armed timer; it has fired.
        state.retry = None;
        self.attempt_connect(&mut state).await;
    }

    // ==================== remote refresh ====================

    /// Pull both collections from the remote store and replace the
    /// mirrors wholesale, seeding the default categories on a fresh
    /// remote. The refreshed mirrors are also what the drain's conflict
    /// checks compare against.
    pub(crate) async fn refresh_from_remote(&self, state: &mut ClientState) -> Result<()> {
        let categories = self.remote.list_all(TargetCollection::Categories).await?;
        if categories.is_empty() {
            self.seed_default_categories(state).await?;
        } else {
            state.categories.replace_all(decode_categories(&categories));
            if state.categories.get(UNCATEGORIZED_ID).is_none() {
                self.seed_reserved_category(state).await?;
            }
        }
        self.persist_categories(state)?;
        self.publish_categories(state);

        let books = self.remote.list_all(TargetCollection::Books).await?;
        state.books.replace_all(decode_books(&books));
        self.persist_books(state)?;
        self.publish_books(state);

        Ok(())
    }

    async fn seed_default_categories(&self, state: &mut ClientState) -> Result<()> {
        tracing::info!("remote categories empty, seeding defaults");

        for category in default_categories(now_ms()) {
            self.remote
                .add(TargetCollection::Categories, category.to_value()?)
                .await?;
            state.categories.upsert(category);
        }
        Ok(())
    }

    async fn seed_reserved_category(&self, state: &mut ClientState) -> Result<()> {
        tracing::warn!("reserved category missing remotely, re-creating it");

        if let Some(reserved) = default_categories(now_ms())
            .into_iter()
            .find(Category::is_reserved)
        {
            self.remote
                .add(TargetCollection::Categories, reserved.to_value()?)
                .await?;
            state.categories.upsert(reserved);
        }
        Ok(())
    }

    // ==================== queue drain ====================

    /// Drain the offline queue, reporting per-operation outcomes, and
    /// settle the final status: `connected` on a clean drain, or the
    /// error/backoff path when operations stay queued.
    pub(crate) async fn run_drain(self: &Arc<Self>, state: &mut ClientState) -> DrainReport {
        if state.queue.is_empty() {
            state.sync.last_synced_at = Some(now_ms());
            if state.sync.status != SyncStatus::Connected {
                self.set_status(state, SyncStatus::Connected, "up to date");
            }
            return DrainReport::default();
        }

        self.set_status(state, SyncStatus::Syncing, "replaying offline operations");

        let report = self.drain_queue(state).await;

        if let Err(e) = state.queue.persist(self.storage.as_ref()) {
            tracing::warn!(error = %e, "failed to persist offline queue after drain");
        }
        self.publish_pending(state);
        if let Err(e) = self.persist_snapshots(state) {
            tracing::warn!(error = %e, "failed to persist catalogue snapshots after drain");
        }
        self.publish_books(state);
        self.publish_categories(state);

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "offline queue drained"
        );

        if report.is_clean() {
            state.sync.last_synced_at = Some(now_ms());
            self.set_status(state, SyncStatus::Connected, "offline changes synced");
        } else {
            self.enter_error(state, "some offline changes failed to sync");
        }

        report
    }

    /// Replay queued operations in enqueue order.
    ///
    /// An operation that fails keeps every later operation on the same
    /// target queued behind it; other targets proceed. A successful
    /// `add` reconciles its temporary id into the rest of the queue.
    async fn drain_queue(&self, state: &mut ClientState) -> DrainReport {
        let mut ops = state.queue.take_all();
        let mut report = DrainReport::default();
        let mut remaining: Vec<QueuedOperation> = Vec::new();
        let mut failed_targets: HashSet<(TargetCollection, String)> = HashSet::new();

        let mut idx = 0;
        while idx < ops.len() {
            let op = ops[idx].clone();
            idx += 1;

            let target_key = op
                .target_id
                .clone()
                .map(|id| (op.target_collection, id));
            if let Some(key) = &target_key {
                if failed_targets.contains(key) {
                    tracing::debug!(op = %op.id, "held back behind a failed operation");
                    report.failed.push(op.id.clone());
                    remaining.push(op);
                    continue;
                }
            }

            match self.replay(state, &op).await {
                Ok(reassigned) => {
                    if let Some((temp_id, remote_id)) = reassigned {
                        for later in ops[idx..].iter_mut() {
                            later.retarget(&temp_id, &remote_id);
                        }
                    }
                    report.succeeded.push(op.id);
                }
                Err(e) => {
                    tracing::warn!(op = %op.id, error = %e, "operation failed to replay");
                    if let Some(key) = target_key {
                        failed_targets.insert(key);
                    }
                    report.failed.push(op.id.clone());
                    remaining.push(op);
                }
            }
        }

        state.queue.replace(remaining);
        report
    }

    /// Replay one queued operation against the remote store, keeping the
    /// mirror in step. Returns the `(temporary, assigned)` id pair when
    /// an add was given a new id by the remote store.
    async fn replay(
        &self,
        state: &mut ClientState,
        op: &QueuedOperation,
    ) -> Result<Option<(String, String)>> {
        let collection = op.target_collection;
        match op.kind {
            OperationKind::Add => {
                let remote_id = self.remote.add(collection, op.payload.clone()).await?;
                let temp_id = op.target_id.clone().unwrap_or_default();

                let record = overlay(&op.payload, &serde_json::json!({ "id": remote_id }));
                match collection {
                    TargetCollection::Books => {
                        state.books.remove(&temp_id);
                    }
                    TargetCollection::Categories => {
                        state.categories.remove(&temp_id);
                    }
                }
                self.adopt_record(state, collection, &record);

                if !temp_id.is_empty() && temp_id != remote_id {
                    tracing::debug!(temp = %temp_id, assigned = %remote_id, "temporary id reconciled");
                    Ok(Some((temp_id, remote_id)))
                } else {
                    Ok(None)
                }
            }
            OperationKind::Update => {
                let Some(target_id) = op.target_id.as_deref() else {
                    tracing::warn!(op = %op.id, "queued update without a target, dropping");
                    return Ok(None);
                };
                self.replay_update(state, op, collection, target_id).await
            }
            OperationKind::Delete => {
                let Some(target_id) = op.target_id.as_deref() else {
                    tracing::warn!(op = %op.id, "queued delete without a target, dropping");
                    return Ok(None);
                };
                self.replay_delete(state, op, collection, target_id).await
            }
        }
    }

    async fn replay_update(
        &self,
        state: &mut ClientState,
        op: &QueuedOperation,
        collection: TargetCollection,
        target_id: &str,
    ) -> Result<Option<(String, String)>> {
        let Some(server) = mirror_value(state, collection, target_id) else {
            // The record is gone from the server view; if it is gone
            // remotely too, the update has nothing left to say.
            return match self
                .remote
                .update(collection, target_id, op.payload.clone())
                .await
            {
                Ok(()) => Ok(None),
                Err(ClientError::RemoteMissing { .. }) => {
                    tracing::debug!(op = %op.id, "update target no longer exists, dropping");
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        };

        let server_ts = modified_at(&server);
        if server_ts > op.enqueued_at {
            // The server copy moved after this write was recorded.
            let local = overlay(&server, &op.payload);
            let outcome = resolve(&local, &server, now_ms());
            match outcome.resolution {
                Resolution::Server => {
                    tracing::debug!(op = %op.id, "server copy is newer, dropping queued update");
                    Ok(None)
                }
                Resolution::Merge | Resolution::Local => {
                    self.remote
                        .update(collection, target_id, outcome.record.clone())
                        .await?;
                    self.adopt_record(state, collection, &outcome.record);
                    Ok(None)
                }
            }
        } else {
            match self
                .remote
                .update(collection, target_id, op.payload.clone())
                .await
            {
                Ok(()) => {
                    self.adopt_record(state, collection, &overlay(&server, &op.payload));
                    Ok(None)
                }
                Err(ClientError::RemoteMissing { .. }) => {
                    tracing::debug!(op = %op.id, "update target deleted remotely, dropping");
                    remove_record(state, collection, target_id);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }

    async fn replay_delete(
        &self,
        state: &mut ClientState,
        op: &QueuedOperation,
        collection: TargetCollection,
        target_id: &str,
    ) -> Result<Option<(String, String)>> {
        if let Some(server) = mirror_value(state, collection, target_id) {
            if modified_at(&server) >= op.enqueued_at {
                // Updated remotely after the delete was recorded; the
                // record survives and stays in the mirror.
                tracing::debug!(op = %op.id, "target changed after delete was queued, keeping it");
                return Ok(None);
            }
        }

        match self.remote.delete(collection, target_id).await {
            Ok(()) => {}
            Err(ClientError::RemoteMissing { .. }) => {
                tracing::debug!(op = %op.id, "delete target already gone");
            }
            Err(e) => return Err(e),
        }
        remove_record(state, collection, target_id);
        Ok(None)
    }

    fn adopt_record(&self, state: &mut ClientState, collection: TargetCollection, record: &Value) {
        match collection {
            TargetCollection::Books => match Book::from_value(record) {
                Ok(book) => state.books.upsert(book),
                Err(e) => tracing::warn!(error = %e, "could not decode replayed book record"),
            },
            TargetCollection::Categories => match Category::from_value(record) {
                Ok(category) => state.categories.upsert(category),
                Err(e) => tracing::warn!(error = %e, "could not decode replayed category record"),
            },
        }
    }

    // ==================== write commit path ====================

    /// Apply a user operation's remote effects, already reflected in the
    /// mirrors. While connected the steps go straight to the remote
    /// store; the first transport failure (or being offline to begin
    /// with) queues the rest for replay.
    pub(crate) async fn commit_all(
        self: &Arc<Self>,
        state: &mut ClientState,
        steps: Vec<WriteOp>,
    ) -> Result<()> {
        let mut pending = VecDeque::from(steps);
        let mut lost_connection = false;

        if state.sync.status == SyncStatus::Connected {
            while let Some(step) = pending.pop_front() {
                match self.apply_direct(&step).await {
                    Ok(()) => {}
                    Err(e) if e.is_transport() => {
                        tracing::warn!(error = %e, "remote write failed, storing changes locally");
                        pending.push_front(step);
                        lost_connection = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        for step in pending {
            self.enqueue_step(state, step);
        }
        state.queue.persist(self.storage.as_ref())?;
        self.publish_pending(state);

        if lost_connection {
            self.enter_error(state, "connection lost, changes stored locally");
        }
        Ok(())
    }

    async fn apply_direct(&self, step: &WriteOp) -> Result<()> {
        match step {
            WriteOp::Add {
                collection,
                record_id,
                record,
            } => {
                let assigned = self.remote.add(*collection, record.clone()).await?;
                if assigned != *record_id {
                    tracing::warn!(
                        supplied = %record_id,
                        assigned = %assigned,
                        "remote store ignored the supplied id"
                    );
                }
                Ok(())
            }
            WriteOp::Update {
                collection,
                record_id,
                patch,
            } => match self.remote.update(*collection, record_id, patch.clone()).await {
                Err(ClientError::RemoteMissing { .. }) => {
                    tracing::warn!(collection = %collection, id = %record_id, "updated record is missing remotely");
                    Ok(())
                }
                other => other,
            },
            WriteOp::Delete {
                collection,
                record_id,
            } => match self.remote.delete(*collection, record_id).await {
                Err(ClientError::RemoteMissing { .. }) => Ok(()),
                other => other,
            },
        }
    }

    fn enqueue_step(&self, state: &mut ClientState, step: WriteOp) {
        let op_id = uuid::Uuid::new_v4().to_string();
        let op = match step {
            WriteOp::Add {
                collection,
                record_id,
                record,
            } => {
                let at = record_time(&record);
                QueuedOperation::add(op_id, collection, record_id, without_id(record), at)
            }
            WriteOp::Update {
                collection,
                record_id,
                patch,
            } => {
                let at = record_time(&patch);
                QueuedOperation::update(op_id, collection, record_id, patch, at)
            }
            WriteOp::Delete {
                collection,
                record_id,
            } => QueuedOperation::delete(op_id, collection, record_id, now_ms()),
        };

        tracing::debug!(
            op = %op.id,
            kind = ?op.kind,
            collection = %op.target_collection,
            "operation stored for later sync"
        );
        state.queue.push(op);
    }

    // ==================== background tasks ====================

    /// Start the long-lived tasks: one subscription intake per
    /// collection, the periodic resync, and the liveness probe.
    pub(crate) fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_intake(TargetCollection::Books),
            self.spawn_intake(TargetCollection::Categories),
            self.spawn_resync_loop(),
            self.spawn_liveness_loop(),
        ]
    }

    fn spawn_intake(self: &Arc<Self>, collection: TargetCollection) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        // Subscribe before anything is written so no snapshot is missed.
        let mut rx = self.remote.subscribe(collection);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(snapshot) => inner.apply_remote_snapshot(collection, snapshot).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            collection = %collection,
                            missed,
                            "change subscription lagged, continuing from the latest snapshot"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Apply one authoritative snapshot pushed by the remote store: the
    /// mirror is replaced wholesale, the fallback snapshot rewritten,
    /// and the typed arrays re-broadcast.
    async fn apply_remote_snapshot(&self, collection: TargetCollection, snapshot: Vec<Value>) {
        let mut state = self.state.lock().await;

        match collection {
            TargetCollection::Books => {
                state.books.replace_all(decode_books(&snapshot));
                if let Err(e) = self.persist_books(&state) {
                    tracing::warn!(error = %e, "failed to persist book snapshot");
                }
                self.publish_books(&state);
            }
            TargetCollection::Categories => {
                state.categories.replace_all(decode_categories(&snapshot));
                if state.categories.get(UNCATEGORIZED_ID).is_none() {
                    tracing::warn!("reserved category missing from snapshot, restoring locally");
                    for category in default_categories(now_ms()) {
                        if category.is_reserved() {
                            state.categories.upsert(category);
                        }
                    }
                }
                if let Err(e) = self.persist_categories(&state) {
                    tracing::warn!(error = %e, "failed to persist category snapshot");
                }
                self.publish_categories(&state);
            }
        }

        tracing::debug!(collection = %collection, records = snapshot.len(), "remote snapshot applied");
    }

    fn spawn_resync_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let period = Duration::from_millis(self.config.resync_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.resync_tick().await;
            }
        })
    }

    async fn resync_tick(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.sync.status != SyncStatus::Connected || state.queue.is_empty() {
            return;
        }

        tracing::debug!(pending = state.queue.len(), "periodic resync");
        match self.refresh_from_remote(&mut state).await {
            Ok(()) => {
                let _ = self.run_drain(&mut state).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "resync refresh failed");
                if e.is_transport() {
                    self.enter_error(&mut state, "connection lost");
                }
            }
        }
    }

    fn spawn_liveness_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let period = Duration::from_millis(self.config.liveness_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.liveness_tick().await;
            }
        })
    }

    async fn liveness_tick(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        match state.sync.status {
            // Explicitly offline; wait for the network-up signal.
            SyncStatus::Disconnected => {}
            SyncStatus::Connected => {
                if let Err(e) = self.remote.ping().await {
                    tracing::warn!(error = %e, "liveness probe failed");
                    self.enter_error(&mut state, "connection unstable");
                }
            }
            SyncStatus::Error => {
                if self.remote.ping().await.is_ok() {
                    self.cancel_retry(&mut state);
                    state.sync.retry_count = 0;
                    self.set_status(&mut state, SyncStatus::Connected, "connection restored");
                }
            }
            // Transient states only exist while the lock is held by the
            // transition itself.
            SyncStatus::Connecting | SyncStatus::Syncing => {}
        }
    }
}

// ==================== payload helpers ====================

/// Shallow-merge `patch`'s fields over `base`.
pub(crate) fn overlay(base: &Value, patch: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(target), Some(fields)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Strip the `id` field so a replayed add gets a fresh remote id.
pub(crate) fn without_id(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.remove("id");
    }
    value
}

/// Stamp `updatedAt` on a payload.
pub(crate) fn stamped(mut value: Value, timestamp: Timestamp) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.insert("updatedAt".into(), serde_json::json!(timestamp));
    }
    value
}

fn record_time(payload: &Value) -> Timestamp {
    match modified_at(payload) {
        0 => now_ms(),
        at => at,
    }
}

fn mirror_value(state: &ClientState, collection: TargetCollection, id: &str) -> Option<Value> {
    let value = match collection {
        TargetCollection::Books => state.books.get(id).map(Book::to_value),
        TargetCollection::Categories => state.categories.get(id).map(Category::to_value),
    };
    match value {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "could not serialize mirror record");
            None
        }
        None => None,
    }
}

fn remove_record(state: &mut ClientState, collection: TargetCollection, id: &str) {
    match collection {
        TargetCollection::Books => {
            state.books.remove(id);
        }
        TargetCollection::Categories => {
            state.categories.remove(id);
        }
    }
}

fn decode_books(records: &[Value]) -> Vec<Book> {
    records
        .iter()
        .filter_map(|record| match Book::from_value(record) {
            Ok(book) => Some(book),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed book record");
                None
            }
        })
        .collect()
}

fn decode_categories(records: &[Value]) -> Vec<Category> {
    records
        .iter()
        .filter_map(|record| match Category::from_value(record) {
            Ok(category) => Some(category),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed category record");
                None
            }
        })
        .collect()
}
