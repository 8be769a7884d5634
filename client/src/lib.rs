//! # Shelfsync Client
//!
//! Offline-tolerant sync client for a book catalogue backed by an
//! abstract remote document store.
//!
//! The [`shelfsync_engine`] crate holds the pure logic (catalogue
//! mirrors, category tree rules, queue wire format, backoff, conflict
//! resolution); this crate is the IO shell around it: the connectivity
//! state machine, the durable offline queue, the remote store and local
//! storage traits, change subscriptions, and ISBN metadata lookup.
//!
//! ## The client
//!
//! [`SyncClient`] is the façade. It owns the in-memory mirrors, drives
//! reconnection with exponential backoff, queues writes made while
//! disconnected and replays them in order on reconnect, resolving
//! conflicts last-writer-wins on `updatedAt`.
//!
//! - **Offline-first writes**: every mutation lands in the mirror and
//!   the local fallback snapshot first; the remote store is attempted
//!   second, and a transport failure queues the write instead of losing
//!   it.
//! - **Network signals**: the host application reports connectivity via
//!   [`SyncClient::network_up`] / [`SyncClient::network_down`]; the
//!   client also probes liveness itself on a timer.
//! - **Observation**: sync status changes, pending-operation counts and
//!   per-entity change batches are all subscribable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shelfsync_client::{InMemoryRemoteStore, MemoryStorage, SyncClient, SyncConfig};
//! use shelfsync_engine::NewBook;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> shelfsync_client::Result<()> {
//!     let client = SyncClient::start(
//!         Arc::new(InMemoryRemoteStore::new()),
//!         Arc::new(MemoryStorage::new()),
//!         SyncConfig::default(),
//!     )
//!     .await?;
//!
//!     let book = client
//!         .add_book(NewBook {
//!             title: "Dune".into(),
//!             author: "Frank Herbert".into(),
//!             ..NewBook::default()
//!         })
//!         .await?;
//!     println!("added {} ({})", book.title, book.id);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

mod books;
mod categories;
mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod lookup;
pub mod queue;
pub mod remote;
pub mod storage;
mod sync;

// Re-export main types at crate root
pub use client::SyncClient;
pub use config::{ConfigError, SyncConfig};
pub use error::{ClientError, Result};
pub use events::{EventHub, SyncStatusChange};
pub use lookup::{parse_google_books, parse_open_library, BookMetadata, MetadataLookup};
pub use queue::{DrainReport, OfflineQueue};
pub use remote::{InMemoryRemoteStore, RemoteStore};
pub use storage::{
    FileStorage, LocalStorage, MemoryStorage, BOOKS_KEY, CATEGORIES_KEY, QUEUE_KEY,
};
