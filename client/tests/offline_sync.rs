//! End-to-end tests for offline writes, the drain protocol and the
//! connection state machine.
//!
//! Every test runs against the in-memory remote store so that network
//! failures can be injected deterministically.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shelfsync_client::{
    ClientError, InMemoryRemoteStore, MemoryStorage, RemoteStore, SyncClient, SyncConfig,
};
use shelfsync_engine::{BookPatch, Error, NewBook, NewCategory, SyncStatus, TargetCollection};

/// Test helper to build a minimal book draft.
fn draft(title: &str, author: &str) -> NewBook {
    NewBook {
        title: title.into(),
        author: author.into(),
        ..NewBook::default()
    }
}

/// Let the background intake tasks drain any published snapshots so
/// that mirror reads are stable.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Install a log subscriber once, so RUST_LOG surfaces client traces
/// when a test fails.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test helper to spin up a client against a fresh reachable remote.
async fn connected_client() -> (Arc<InMemoryRemoteStore>, Arc<MemoryStorage>, SyncClient) {
    init_tracing();
    let remote = Arc::new(InMemoryRemoteStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let client = SyncClient::start(remote.clone(), storage.clone(), SyncConfig::default())
        .await
        .unwrap();
    settle().await;
    (remote, storage, client)
}

#[cfg(test)]
mod offline_sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_connected_write_reaches_remote_directly() {
        let (remote, _storage, client) = connected_client().await;
        assert_eq!(client.status().await.status, SyncStatus::Connected);

        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();

        assert_eq!(client.pending_operations().await, 0);
        let stored = remote.record(TargetCollection::Books, &book.id).unwrap();
        assert_eq!(stored["title"], "Dune");
        assert_eq!(stored["category"], "uncategorized");
    }

    #[tokio::test]
    async fn test_offline_writes_queue_and_replay_on_reconnect() {
        let (remote, _storage, client) = connected_client().await;

        remote.set_reachable(false);
        client.network_down().await;
        assert_eq!(client.status().await.status, SyncStatus::Disconnected);

        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        assert!(book.id.starts_with("local-"));
        assert_eq!(client.pending_operations().await, 1);
        assert_eq!(remote.record_count(TargetCollection::Books), 0);
        // The optimistic copy is queryable straight away.
        assert_eq!(client.book(&book.id).await.unwrap().title, "Dune");

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Books), 1);

        let books = client.books().await;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
        // The temporary id was swapped for the remote one during replay.
        assert_ne!(books[0].id, book.id);
        assert!(!books[0].id.starts_with("local-"));
    }

    #[tokio::test]
    async fn test_temp_id_retargets_later_queued_operations() {
        let (remote, _storage, client) = connected_client().await;

        remote.set_reachable(false);
        client.network_down().await;

        let poetry = client
            .add_category(NewCategory::root("Poetry"))
            .await
            .unwrap();
        let mut book_draft = draft("Ariel", "Sylvia Plath");
        book_draft.category = Some(poetry.id.clone());
        client.add_book(book_draft).await.unwrap();
        assert_eq!(client.pending_operations().await, 2);

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;
        assert_eq!(client.pending_operations().await, 0);

        let categories = client.categories().await;
        let synced = categories.iter().find(|c| c.name == "Poetry").unwrap();
        assert_ne!(synced.id, poetry.id);

        // The queued book add was retargeted at the remote category id.
        let books = client.books().await;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].category, synced.id);
        let stored = remote.record(TargetCollection::Books, &books[0].id).unwrap();
        assert_eq!(stored["category"].as_str(), Some(synced.id.as_str()));
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        init_tracing();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let storage = Arc::new(MemoryStorage::new());

        let client = SyncClient::start(remote.clone(), storage.clone(), SyncConfig::default())
            .await
            .unwrap();
        remote.set_reachable(false);
        client.network_down().await;
        client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        assert_eq!(client.pending_operations().await, 1);
        client.shutdown().await;

        // The remote is still unreachable: the next client hydrates from
        // the persisted snapshots and keeps the queue.
        let client = SyncClient::start(remote.clone(), storage.clone(), SyncConfig::default())
            .await
            .unwrap();
        assert_eq!(client.status().await.status, SyncStatus::Error);
        assert_eq!(client.pending_operations().await, 1);
        assert_eq!(client.books().await.len(), 1);

        remote.set_reachable(true);
        client.network_up().await;
        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Books), 1);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_conflict_newer_server_copy_wins() {
        let (remote, _storage, client) = connected_client().await;
        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();

        remote.set_reachable(false);
        client.network_down().await;
        let patch = BookPatch {
            title: Some("Dune [local edit]".into()),
            ..BookPatch::default()
        };
        client.update_book(&book.id, patch).await.unwrap();
        assert_eq!(client.pending_operations().await, 1);

        // Another writer rewrites the record well after our edit.
        let mut server_copy = remote.record(TargetCollection::Books, &book.id).unwrap();
        server_copy["title"] = json!("Dune [server edit]");
        server_copy["updatedAt"] = json!(book.updated_at + 3_600_000);
        remote.insert_direct(TargetCollection::Books, server_copy);

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 0);
        let synced = client.book(&book.id).await.unwrap();
        assert_eq!(synced.title, "Dune [server edit]");
        let stored = remote.record(TargetCollection::Books, &book.id).unwrap();
        assert_eq!(stored["title"], "Dune [server edit]");
    }

    #[tokio::test]
    async fn test_queued_delete_skipped_when_server_copy_is_newer() {
        let (remote, _storage, client) = connected_client().await;
        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        settle().await;

        remote.set_reachable(false);
        client.network_down().await;
        client.delete_book(&book.id).await.unwrap();
        assert!(client.book(&book.id).await.is_none());

        let mut server_copy = remote.record(TargetCollection::Books, &book.id).unwrap();
        server_copy["title"] = json!("Dune (revised)");
        server_copy["updatedAt"] = json!(book.updated_at + 3_600_000);
        remote.insert_direct(TargetCollection::Books, server_copy);

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        // The newer server copy outlives the stale delete.
        assert_eq!(client.pending_operations().await, 0);
        assert!(remote.record(TargetCollection::Books, &book.id).is_some());
        assert_eq!(client.book(&book.id).await.unwrap().title, "Dune (revised)");
    }

    #[tokio::test]
    async fn test_replayed_delete_for_missing_record_counts_as_success() {
        let (remote, _storage, client) = connected_client().await;
        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        settle().await;

        remote.set_reachable(false);
        client.network_down().await;
        client.delete_book(&book.id).await.unwrap();
        assert_eq!(client.pending_operations().await, 1);

        // Another writer already deleted the record.
        remote.set_reachable(true);
        remote
            .delete(TargetCollection::Books, &book.id)
            .await
            .unwrap();
        remote.set_reachable(false);
        settle().await;

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        // The double delete settles cleanly instead of failing the drain.
        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Books), 0);
    }

    #[tokio::test]
    async fn test_queued_update_for_deleted_record_is_dropped() {
        let (remote, _storage, client) = connected_client().await;
        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        settle().await;

        remote.set_reachable(false);
        client.network_down().await;
        let patch = BookPatch {
            title: Some("Dune Messiah".into()),
            ..BookPatch::default()
        };
        client.update_book(&book.id, patch).await.unwrap();

        // Another writer deletes the record while we are offline.
        remote.set_reachable(true);
        remote
            .delete(TargetCollection::Books, &book.id)
            .await
            .unwrap();
        remote.set_reachable(false);
        settle().await;

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        // The orphaned update counts as settled, not as a failure.
        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 0);
        assert!(client.book(&book.id).await.is_none());
        assert_eq!(remote.record_count(TargetCollection::Books), 0);
    }

    #[tokio::test]
    async fn test_failed_target_holds_back_later_operations() {
        let (remote, _storage, client) = connected_client().await;
        let book = client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();

        remote.set_reachable(false);
        client.network_down().await;
        let rename = BookPatch {
            title: Some("Dune Messiah".into()),
            ..BookPatch::default()
        };
        client.update_book(&book.id, rename).await.unwrap();
        let reauthor = BookPatch {
            author: Some("F. Herbert".into()),
            ..BookPatch::default()
        };
        client.update_book(&book.id, reauthor).await.unwrap();
        assert_eq!(client.pending_operations().await, 2);

        // The first write attempt dies on the wire; the second op on the
        // same record must not jump the queue.
        remote.set_reachable(true);
        remote.fail_next_writes(1);
        client.network_up().await;

        assert_eq!(client.status().await.status, SyncStatus::Error);
        assert_eq!(client.pending_operations().await, 2);
        let stored = remote.record(TargetCollection::Books, &book.id).unwrap();
        assert_eq!(stored["title"], "Dune");

        // The next reconnect replays both in enqueue order.
        client.network_up().await;
        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 0);
        let stored = remote.record(TargetCollection::Books, &book.id).unwrap();
        assert_eq!(stored["title"], "Dune Messiah");
        assert_eq!(stored["author"], "F. Herbert");
    }

    #[tokio::test]
    async fn test_retry_backoff_reconnects_and_drains() {
        let (remote, _storage, client) = connected_client().await;

        // A write that dies on the wire queues the operation and degrades
        // the connection.
        remote.fail_next_writes(1);
        client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        assert_eq!(client.status().await.status, SyncStatus::Error);
        assert_eq!(client.pending_operations().await, 1);

        // The first retry fires after one second and drains the queue.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert!(client.status().await.last_synced_at.is_some());
        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Books), 1);
    }

    #[tokio::test]
    async fn test_sync_now_flushes_connected_queue() {
        init_tracing();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let config = SyncConfig {
            liveness_interval_ms: 20,
            ..SyncConfig::default()
        };
        let client = SyncClient::start(remote.clone(), storage.clone(), config)
            .await
            .unwrap();
        settle().await;

        remote.fail_next_writes(1);
        client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        assert_eq!(client.pending_operations().await, 1);

        // The liveness probe notices the store answering again; it does
        // not drain by itself.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.status().await.status, SyncStatus::Connected);
        assert_eq!(client.pending_operations().await, 1);

        let report = client.sync_now().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Books), 1);

        let books = client.books().await;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
    }

    #[tokio::test]
    async fn test_duplicate_isbn_is_rejected() {
        let (_remote, _storage, client) = connected_client().await;
        let mut first = draft("Dune", "Frank Herbert");
        first.isbn = Some("978-0-441-17271-9".into());
        client.add_book(first).await.unwrap();

        // The same ISBN in another hyphenation is still a duplicate.
        let mut second = draft("Dune (reissue)", "Frank Herbert");
        second.isbn = Some("9780441172719".into());
        let err = client.add_book(second).await.unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::DuplicateIsbn(_))));
        assert_eq!(client.books().await.len(), 1);
    }

    #[tokio::test]
    async fn test_status_listeners_observe_transitions() {
        let (_remote, _storage, client) = connected_client().await;
        let (listener_id, mut events) = client.subscribe_status();

        client.network_down().await;
        client.network_up().await;

        let change = events.recv().await.unwrap();
        assert_eq!(change.status, SyncStatus::Disconnected);
        assert_eq!(change.previous_status, SyncStatus::Connected);
        assert!(change.message.contains("stored locally"));

        let change = events.recv().await.unwrap();
        assert_eq!(change.status, SyncStatus::Connecting);
        let change = events.recv().await.unwrap();
        assert_eq!(change.status, SyncStatus::Connected);

        client.unsubscribe_status(&listener_id);
        client.network_down().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pending_watch_tracks_queue_length() {
        let (remote, _storage, client) = connected_client().await;
        let pending = client.subscribe_pending();
        assert_eq!(*pending.borrow(), 0);

        remote.set_reachable(false);
        client.network_down().await;
        client
            .add_book(draft("Dune", "Frank Herbert"))
            .await
            .unwrap();
        client
            .add_book(draft("Emma", "Jane Austen"))
            .await
            .unwrap();
        assert_eq!(*pending.borrow(), 2);

        remote.set_reachable(true);
        client.network_up().await;
        assert_eq!(*pending.borrow(), 0);
    }

    #[tokio::test]
    async fn test_remote_push_updates_the_mirror() {
        let (remote, _storage, client) = connected_client().await;
        let mut snapshots = client.subscribe_books();

        let pushed = json!({
            "id": "ext-1",
            "title": "Foundation",
            "author": "Isaac Asimov",
            "category": "uncategorized",
            "createdAt": 1_700_000_000_000_u64,
            "updatedAt": 1_700_000_000_000_u64,
        });
        remote.insert_direct(TargetCollection::Books, pushed);

        // The subscription intake republishes once the snapshot lands.
        let snapshot = snapshots.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "ext-1");
        assert_eq!(client.book("ext-1").await.unwrap().title, "Foundation");
    }
}
