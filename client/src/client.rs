//! The sync client façade and its shared state.
//!
//! [`SyncClient`] owns the catalogue mirrors, the offline queue, and the
//! connectivity state machine. Every mutation and every remote call is
//! serialized through one async mutex, so a second operation issued
//! while one is in flight queues behind it instead of interleaving.

use crate::config::SyncConfig;
use crate::events::{EventHub, SyncStatusChange};
use crate::lookup::{BookMetadata, MetadataLookup};
use crate::queue::{DrainReport, OfflineQueue};
use crate::remote::RemoteStore;
use crate::storage::{LocalStorage, BOOKS_KEY, CATEGORIES_KEY};
use crate::Result;
use shelfsync_engine::{
    Book, BookCatalog, Category, CategoryCatalog, CategoryNode, CategoryTree, SyncState,
    SyncStatus, Timestamp,
};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Wall-clock time in milliseconds since the epoch.
pub(crate) fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Id for a record created locally. While connected the remote store
/// honours the plain UUID; while offline the id carries a `local-`
/// prefix and is replaced when the drain replays the add.
pub(crate) fn fresh_record_id(state: &ClientState) -> String {
    let id = uuid::Uuid::new_v4();
    if state.sync.status == SyncStatus::Connected {
        id.to_string()
    } else {
        format!("local-{id}")
    }
}

/// Everything guarded by the client mutex.
pub(crate) struct ClientState {
    pub(crate) books: BookCatalog,
    pub(crate) categories: CategoryCatalog,
    pub(crate) queue: OfflineQueue,
    pub(crate) sync: SyncState,
    /// Bumped on every external network signal; in-flight probes and
    /// armed retries from an older epoch discard themselves.
    pub(crate) epoch: u64,
    /// The armed reconnect timer, if any.
    pub(crate) retry: Option<JoinHandle<()>>,
}

pub(crate) struct ClientInner {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) storage: Arc<dyn LocalStorage>,
    pub(crate) config: SyncConfig,
    pub(crate) lookup: MetadataLookup,
    pub(crate) state: Mutex<ClientState>,
    pub(crate) events: EventHub,
    pub(crate) books_tx: broadcast::Sender<Vec<Book>>,
    pub(crate) categories_tx: broadcast::Sender<Vec<Category>>,
    pub(crate) pending_tx: watch::Sender<usize>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
    /// Transition the sync status, notifying listeners.
    pub(crate) fn set_status(&self, state: &mut ClientState, status: SyncStatus, message: &str) {
        let previous = state.sync.status;
        state.sync.status = status;

        tracing::info!(previous = %previous, status = %status, message, "sync status changed");

        self.events.emit(SyncStatusChange {
            status,
            message: message.to_string(),
            previous_status: previous,
        });
    }

    /// Disarm a pending reconnect timer.
    pub(crate) fn cancel_retry(&self, state: &mut ClientState) {
        if let Some(handle) = state.retry.take() {
            handle.abort();
        }
    }

    pub(crate) fn publish_books(&self, state: &ClientState) {
        let books: Vec<Book> = state.books.by_created_desc().into_iter().cloned().collect();
        let _ = self.books_tx.send(books);
    }

    pub(crate) fn publish_categories(&self, state: &ClientState) {
        let categories: Vec<Category> =
            state.categories.by_name_asc().into_iter().cloned().collect();
        let _ = self.categories_tx.send(categories);
    }

    pub(crate) fn publish_pending(&self, state: &ClientState) {
        self.pending_tx.send_replace(state.queue.len());
    }

    pub(crate) fn persist_books(&self, state: &ClientState) -> Result<()> {
        let encoded = state.books.encode()?;
        self.storage.set(BOOKS_KEY, &encoded)
    }

    pub(crate) fn persist_categories(&self, state: &ClientState) -> Result<()> {
        let encoded = state.categories.encode()?;
        self.storage.set(CATEGORIES_KEY, &encoded)
    }

    pub(crate) fn persist_snapshots(&self, state: &ClientState) -> Result<()> {
        self.persist_books(state)?;
        self.persist_categories(state)
    }
}

/// Offline-tolerant catalogue client.
///
/// Cheap to clone; clones share the same state, queue, and background
/// tasks.
#[derive(Clone)]
pub struct SyncClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl SyncClient {
    /// Bring up a client: hydrate the mirrors and the offline queue from
    /// local storage, start the background tasks, then attempt the
    /// initial connect. A remote that does not answer leaves the client
    /// on local data with a retry armed.
    pub async fn start(
        remote: Arc<dyn RemoteStore>,
        storage: Arc<dyn LocalStorage>,
        config: SyncConfig,
    ) -> Result<Self> {
        let books = load_books(storage.as_ref());
        let categories = load_categories(storage.as_ref());
        let queue = OfflineQueue::load(storage.as_ref())?;

        tracing::info!(
            books = books.len(),
            categories = categories.len(),
            pending = queue.len(),
            "starting sync client from local snapshots"
        );

        let (books_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (categories_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (pending_tx, _) = watch::channel(queue.len());
        let lookup = MetadataLookup::new(config.google_books_api_key.clone());

        let inner = Arc::new(ClientInner {
            remote,
            storage,
            config,
            lookup,
            state: Mutex::new(ClientState {
                books,
                categories,
                queue,
                sync: SyncState::new(),
                epoch: 0,
                retry: None,
            }),
            events: EventHub::new(),
            books_tx,
            categories_tx,
            pending_tx,
            tasks: StdMutex::new(Vec::new()),
        });

        let handles = inner.spawn_background();
        *inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = handles;

        {
            let mut state = inner.state.lock().await;
            inner.attempt_connect(&mut state).await;
        }

        Ok(Self { inner })
    }

    /// Stop the background tasks and disarm any pending retry. Queued
    /// operations stay in durable storage for the next start.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.epoch += 1;
            self.inner.cancel_retry(&mut state);
        }

        let handles = {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        for handle in handles {
            handle.abort();
        }

        tracing::info!("sync client shut down");
    }

    /// External signal that the network is back. Resets the retry counter
    /// and attempts to connect immediately.
    pub async fn network_up(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.epoch += 1;
        inner.cancel_retry(&mut state);
        state.sync.retry_count = 0;

        tracing::info!("network up signal received");
        inner.attempt_connect(&mut state).await;
    }

    /// External signal that the network is gone. Supersedes any in-flight
    /// probe and stops automatic retries until the next up signal.
    pub async fn network_down(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.epoch += 1;
        inner.cancel_retry(&mut state);

        inner.set_status(
            &mut state,
            SyncStatus::Disconnected,
            "network connection lost, changes will be stored locally",
        );
    }

    /// Drain the offline queue right now instead of waiting for the next
    /// resync tick. Does nothing unless connected.
    pub async fn sync_now(&self) -> Result<DrainReport> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        if state.sync.status != SyncStatus::Connected {
            tracing::debug!(status = %state.sync.status, "sync requested while not connected");
            return Ok(DrainReport::default());
        }

        match inner.refresh_from_remote(&mut state).await {
            Ok(()) => Ok(inner.run_drain(&mut state).await),
            Err(e) => {
                if e.is_transport() {
                    inner.enter_error(&mut state, "connection lost during sync");
                }
                Err(e)
            }
        }
    }

    /// Current connectivity state.
    pub async fn status(&self) -> SyncState {
        self.inner.state.lock().await.sync.clone()
    }

    /// Number of operations waiting for replay.
    pub async fn pending_operations(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// All books, newest first.
    pub async fn books(&self) -> Vec<Book> {
        let state = self.inner.state.lock().await;
        state.books.by_created_desc().into_iter().cloned().collect()
    }

    /// One book by id.
    pub async fn book(&self, id: &str) -> Option<Book> {
        self.inner.state.lock().await.books.get(id).cloned()
    }

    /// All categories, sorted by name.
    pub async fn categories(&self) -> Vec<Category> {
        let state = self.inner.state.lock().await;
        state.categories.by_name_asc().into_iter().cloned().collect()
    }

    /// One category by id.
    pub async fn category(&self, id: &str) -> Option<Category> {
        self.inner.state.lock().await.categories.get(id).cloned()
    }

    /// The category hierarchy as a forest of nested nodes.
    pub async fn category_forest(&self) -> Vec<CategoryNode> {
        let state = self.inner.state.lock().await;
        CategoryTree::new(&state.categories).build_forest()
    }

    /// Register a sync status listener. Returns the listener id and the
    /// receiving end; unregister by id or just drop the receiver.
    pub fn subscribe_status(&self) -> (String, mpsc::UnboundedReceiver<SyncStatusChange>) {
        self.inner.events.register()
    }

    /// Remove a status listener.
    pub fn unsubscribe_status(&self, listener_id: &str) {
        self.inner.events.unregister(listener_id);
    }

    /// Subscribe to full-replacement book snapshots, newest first.
    pub fn subscribe_books(&self) -> broadcast::Receiver<Vec<Book>> {
        self.inner.books_tx.subscribe()
    }

    /// Subscribe to full-replacement category snapshots, name-sorted.
    pub fn subscribe_categories(&self) -> broadcast::Receiver<Vec<Category>> {
        self.inner.categories_tx.subscribe()
    }

    /// Watch the pending offline operation count.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.inner.pending_tx.subscribe()
    }

    /// Look up book metadata by ISBN across the configured providers.
    pub async fn lookup_isbn(&self, raw_isbn: &str) -> Result<BookMetadata> {
        self.inner.lookup.lookup(raw_isbn).await
    }
}

fn load_books(storage: &dyn LocalStorage) -> BookCatalog {
    match storage.get(BOOKS_KEY) {
        Ok(None) => BookCatalog::new(),
        Ok(Some(raw)) => match BookCatalog::decode(&raw) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "stored book snapshot is corrupt, starting empty");
                BookCatalog::new()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored book snapshot");
            BookCatalog::new()
        }
    }
}

fn load_categories(storage: &dyn LocalStorage) -> CategoryCatalog {
    match storage.get(CATEGORIES_KEY) {
        Ok(None) => CategoryCatalog::new(),
        Ok(Some(raw)) => match CategoryCatalog::decode(&raw) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "stored category snapshot is corrupt, starting empty");
                CategoryCatalog::new()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored category snapshot");
            CategoryCatalog::new()
        }
    }
}
