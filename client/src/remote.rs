//! Remote document store interface and the in-memory implementation.
//!
//! The client only ever talks to the remote through [`RemoteStore`], so
//! tests and local-only deployments run against [`InMemoryRemoteStore`]
//! while production wires in a real backend.

use crate::{ClientError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use shelfsync_engine::TargetCollection;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Asynchronous document store holding the books and categories
/// collections.
///
/// `add` honours a caller-supplied string `id` field in the payload and
/// assigns one otherwise. `update` and `delete` report
/// [`ClientError::RemoteMissing`] for absent ids; the queue drain treats
/// that as success. Every call may fail with a transport error.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Fetch every record in a collection.
    async fn list_all(&self, collection: TargetCollection) -> Result<Vec<Value>>;

    /// Insert a record, returning its id.
    async fn add(&self, collection: TargetCollection, payload: Value) -> Result<String>;

    /// Merge a partial payload into an existing record.
    async fn update(&self, collection: TargetCollection, id: &str, patch: Value) -> Result<()>;

    /// Remove a record.
    async fn delete(&self, collection: TargetCollection, id: &str) -> Result<()>;

    /// Subscribe to full-replacement snapshots of a collection. Every
    /// successful write publishes the complete collection; dropping the
    /// receiver is the unsubscribe.
    fn subscribe(&self, collection: TargetCollection) -> broadcast::Receiver<Vec<Value>>;
}

/// Snapshots buffered per subscriber before lagging.
const SNAPSHOT_CAPACITY: usize = 64;

/// One remote collection: records plus its snapshot publisher.
#[derive(Debug)]
struct Collection {
    records: DashMap<String, Value>,
    publisher: broadcast::Sender<Vec<Value>>,
}

impl Collection {
    fn new() -> Self {
        let (publisher, _) = broadcast::channel(SNAPSHOT_CAPACITY);
        Self {
            records: DashMap::new(),
            publisher,
        }
    }

    fn snapshot(&self) -> Vec<Value> {
        let mut records: Vec<Value> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(record_id);
        records
    }

    fn publish(&self) {
        // Nobody listening is fine.
        let _ = self.publisher.send(self.snapshot());
    }
}

fn record_id(record: &Value) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// In-memory remote store backing tests and local-only operation.
///
/// Failure injection drives the offline paths: [`set_reachable`] fails
/// every call until flipped back, [`fail_next_writes`] fails the next N
/// writes only.
///
/// [`set_reachable`]: InMemoryRemoteStore::set_reachable
/// [`fail_next_writes`]: InMemoryRemoteStore::fail_next_writes
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    books: Collection,
    categories: Collection,
    reachable: AtomicBool,
    failing_writes: AtomicU32,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            books: Collection::new(),
            categories: Collection::new(),
            reachable: AtomicBool::new(true),
            failing_writes: AtomicU32::new(0),
        }
    }

    /// Simulate the network going down (false) or recovering (true).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `count` write calls with a transport error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of records currently stored in a collection.
    pub fn record_count(&self, collection: TargetCollection) -> usize {
        self.shelf(collection).records.len()
    }

    /// Direct record access for test assertions.
    pub fn record(&self, collection: TargetCollection, id: &str) -> Option<Value> {
        self.shelf(collection)
            .records
            .get(id)
            .map(|entry| entry.value().clone())
    }

    /// Write a record directly, as another client would, and publish the
    /// updated snapshot to subscribers.
    pub fn insert_direct(&self, collection: TargetCollection, record: Value) {
        let shelf = self.shelf(collection);
        shelf.records.insert(record_id(&record), record);
        shelf.publish();
    }

    fn shelf(&self, collection: TargetCollection) -> &Collection {
        match collection {
            TargetCollection::Books => &self.books,
            TargetCollection::Categories => &self.categories,
        }
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Transport("remote store offline".into()))
        }
    }

    fn check_write(&self) -> Result<()> {
        self.check_reachable()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(ClientError::Transport("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn list_all(&self, collection: TargetCollection) -> Result<Vec<Value>> {
        self.check_reachable()?;
        Ok(self.shelf(collection).snapshot())
    }

    async fn add(&self, collection: TargetCollection, mut payload: Value) -> Result<String> {
        self.check_write()?;

        let id = match payload.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        if let Some(object) = payload.as_object_mut() {
            object.insert("id".into(), Value::String(id.clone()));
        }

        let shelf = self.shelf(collection);
        shelf.records.insert(id.clone(), payload);
        shelf.publish();
        Ok(id)
    }

    async fn update(&self, collection: TargetCollection, id: &str, patch: Value) -> Result<()> {
        self.check_write()?;

        let shelf = self.shelf(collection);
        {
            let mut record = shelf
                .records
                .get_mut(id)
                .ok_or_else(|| ClientError::RemoteMissing {
                    collection,
                    id: id.to_string(),
                })?;
            if let (Some(target), Some(fields)) = (record.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        shelf.publish();
        Ok(())
    }

    async fn delete(&self, collection: TargetCollection, id: &str) -> Result<()> {
        self.check_write()?;

        let shelf = self.shelf(collection);
        if shelf.records.remove(id).is_none() {
            return Err(ClientError::RemoteMissing {
                collection,
                id: id.to_string(),
            });
        }
        shelf.publish();
        Ok(())
    }

    fn subscribe(&self, collection: TargetCollection) -> broadcast::Receiver<Vec<Value>> {
        self.shelf(collection).publisher.subscribe()
    }
}
