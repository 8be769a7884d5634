//! End-to-end tests for the category tree: seeding, hierarchy edits and
//! cascade deletes, on both the local mirror and the remote store.

use std::sync::Arc;
use std::time::Duration;

use shelfsync_client::{
    ClientError, InMemoryRemoteStore, MemoryStorage, RemoteStore, SyncClient, SyncConfig,
};
use shelfsync_engine::{
    CategoryPatch, Error, NewBook, NewCategory, TargetCollection, UNCATEGORIZED_ID,
};

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
mod category_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_seeds_default_categories_on_first_connect() {
        let (remote, _storage, client) = connected_client().await;

        let categories = client.categories().await;
        assert_eq!(categories.len(), 3);
        let ids: Vec<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"fiction"));
        assert!(ids.contains(&"non-fiction"));
        assert!(ids.contains(&UNCATEGORIZED_ID));

        assert_eq!(remote.record_count(TargetCollection::Categories), 3);
        let stored = remote
            .record(TargetCollection::Categories, "fiction")
            .unwrap();
        assert_eq!(stored["path"], "/Fiction");
        assert_eq!(stored["level"], 0);
    }

    #[tokio::test]
    async fn test_seeding_runs_only_against_an_empty_remote() {
        let (remote, _storage, client) = connected_client().await;
        client.shutdown().await;

        let client = SyncClient::start(
            remote.clone(),
            Arc::new(MemoryStorage::new()),
            SyncConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(remote.record_count(TargetCollection::Categories), 3);
        assert_eq!(client.categories().await.len(), 3);
    }

    #[tokio::test]
    async fn test_restores_missing_reserved_category() {
        let (remote, _storage, client) = connected_client().await;
        client.shutdown().await;

        remote
            .delete(TargetCollection::Categories, UNCATEGORIZED_ID)
            .await
            .unwrap();
        assert_eq!(remote.record_count(TargetCollection::Categories), 2);

        let client = SyncClient::start(
            remote.clone(),
            Arc::new(MemoryStorage::new()),
            SyncConfig::default(),
        )
        .await
        .unwrap();

        assert!(remote
            .record(TargetCollection::Categories, UNCATEGORIZED_ID)
            .is_some());
        assert!(client.category(UNCATEGORIZED_ID).await.is_some());
    }

    #[tokio::test]
    async fn test_child_category_gets_level_and_path() {
        let (remote, _storage, client) = connected_client().await;

        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();
        assert_eq!(scifi.level, 1);
        assert_eq!(scifi.path, "/Fiction/Sci-Fi");
        assert_eq!(scifi.parent_id.as_deref(), Some("fiction"));

        let stored = remote
            .record(TargetCollection::Categories, &scifi.id)
            .unwrap();
        assert_eq!(stored["path"], "/Fiction/Sci-Fi");
        assert_eq!(stored["level"], 1);
        assert_eq!(stored["parentId"], "fiction");
    }

    #[tokio::test]
    async fn test_rejects_invalid_drafts() {
        let (_remote, _storage, client) = connected_client().await;
        client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();

        let err = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Engine(Error::DuplicateSibling { .. })
        ));

        let err = client
            .add_category(NewCategory::root("   "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Engine(Error::MissingRequiredField(_))
        ));

        let err = client
            .add_category(NewCategory::child_of("Orphan", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::CategoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_categories_past_the_depth_limit() {
        let (_remote, _storage, client) = connected_client().await;

        // fiction sits at level 0; four more levels are allowed below it.
        let mut parent = "fiction".to_string();
        for name in ["A", "B", "C", "D"] {
            let child = client
                .add_category(NewCategory::child_of(name, parent.clone()))
                .await
                .unwrap();
            parent = child.id;
        }

        let err = client
            .add_category(NewCategory::child_of("E", parent))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Engine(Error::DepthExceeded { level: 5, max: 4 })
        ));
    }

    #[tokio::test]
    async fn test_rename_cascades_to_descendant_paths() {
        let (remote, _storage, client) = connected_client().await;
        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();
        let cyber = client
            .add_category(NewCategory::child_of("Cyberpunk", scifi.id.clone()))
            .await
            .unwrap();

        let patch = CategoryPatch {
            name: Some("Novels".into()),
            description: None,
        };
        let renamed = client.update_category("fiction", patch).await.unwrap();
        assert_eq!(renamed.name, "Novels");
        assert_eq!(renamed.path, "/Novels");

        let leaf = client.category(&cyber.id).await.unwrap();
        assert_eq!(leaf.path, "/Novels/Sci-Fi/Cyberpunk");

        let stored = remote
            .record(TargetCollection::Categories, &cyber.id)
            .unwrap();
        assert_eq!(stored["path"], "/Novels/Sci-Fi/Cyberpunk");
        let stored = remote
            .record(TargetCollection::Categories, "fiction")
            .unwrap();
        assert_eq!(stored["name"], "Novels");

        // A description-only patch leaves the tree alone.
        let patch = CategoryPatch {
            name: None,
            description: Some("Long-form stories".into()),
        };
        let updated = client.update_category(&scifi.id, patch).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Long-form stories"));
        assert_eq!(updated.path, "/Novels/Sci-Fi");
    }

    #[tokio::test]
    async fn test_reparent_moves_the_whole_subtree() {
        let (remote, _storage, client) = connected_client().await;
        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();
        let cyber = client
            .add_category(NewCategory::child_of("Cyberpunk", scifi.id.clone()))
            .await
            .unwrap();

        let moved = client
            .reparent_category(&scifi.id, Some("non-fiction"))
            .await
            .unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some("non-fiction"));
        assert_eq!(moved.path, "/Non-Fiction/Sci-Fi");
        assert_eq!(moved.level, 1);

        let leaf = client.category(&cyber.id).await.unwrap();
        assert_eq!(leaf.path, "/Non-Fiction/Sci-Fi/Cyberpunk");
        assert_eq!(leaf.level, 2);

        let stored = remote
            .record(TargetCollection::Categories, &scifi.id)
            .unwrap();
        assert_eq!(stored["parentId"], "non-fiction");
        assert_eq!(stored["path"], "/Non-Fiction/Sci-Fi");

        // Moving a node under its own descendant is refused.
        let err = client
            .reparent_category(&scifi.id, Some(&cyber.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::CycleDetected(_))));
        let err = client
            .reparent_category(&scifi.id, Some("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::CategoryNotFound(_))));

        // Back to the root: the stored parent becomes an explicit null.
        let rooted = client.reparent_category(&scifi.id, None).await.unwrap();
        assert_eq!(rooted.parent_id, None);
        assert_eq!(rooted.path, "/Sci-Fi");
        assert_eq!(rooted.level, 0);
        let stored = remote
            .record(TargetCollection::Categories, &scifi.id)
            .unwrap();
        assert!(stored["parentId"].is_null());
    }

    #[tokio::test]
    async fn test_reserved_category_rejects_mutation() {
        let (_remote, _storage, client) = connected_client().await;

        let rename = CategoryPatch {
            name: Some("Misc".into()),
            description: None,
        };
        let err = client
            .update_category(UNCATEGORIZED_ID, rename)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::ReservedCategory(_))));

        let err = client
            .reparent_category(UNCATEGORIZED_ID, Some("fiction"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::ReservedCategory(_))));

        let err = client.delete_category(UNCATEGORIZED_ID).await.unwrap_err();
        assert!(matches!(err, ClientError::Engine(Error::ReservedCategory(_))));

        assert!(client.category(UNCATEGORIZED_ID).await.is_some());
    }

    #[tokio::test]
    async fn test_cascade_delete_reassigns_books() {
        let (remote, _storage, client) = connected_client().await;
        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();
        let cyber = client
            .add_category(NewCategory::child_of("Cyberpunk", scifi.id.clone()))
            .await
            .unwrap();

        let mut in_fiction = draft("Dune", "Frank Herbert");
        in_fiction.category = Some("fiction".into());
        let doomed_root = client.add_book(in_fiction).await.unwrap();
        let mut in_cyber = draft("Neuromancer", "William Gibson");
        in_cyber.category = Some(cyber.id.clone());
        let doomed_leaf = client.add_book(in_cyber).await.unwrap();
        let mut elsewhere = draft("Cosmos", "Carl Sagan");
        elsewhere.category = Some("non-fiction".into());
        let survivor = client.add_book(elsewhere).await.unwrap();

        client.delete_category("fiction").await.unwrap();
        settle().await;

        assert!(client.category("fiction").await.is_none());
        assert!(client.category(&scifi.id).await.is_none());
        assert!(client.category(&cyber.id).await.is_none());
        assert_eq!(remote.record_count(TargetCollection::Categories), 2);

        // Books from the deleted subtree land in the reserved root; books
        // elsewhere keep their category.
        let book = client.book(&doomed_root.id).await.unwrap();
        assert_eq!(book.category, UNCATEGORIZED_ID);
        let book = client.book(&doomed_leaf.id).await.unwrap();
        assert_eq!(book.category, UNCATEGORIZED_ID);
        let book = client.book(&survivor.id).await.unwrap();
        assert_eq!(book.category, "non-fiction");

        let stored = remote
            .record(TargetCollection::Books, &doomed_leaf.id)
            .unwrap();
        assert_eq!(stored["category"], "uncategorized");
    }

    #[tokio::test]
    async fn test_offline_cascade_replays_in_order() {
        let (remote, _storage, client) = connected_client().await;
        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();
        let mut in_scifi = draft("Neuromancer", "William Gibson");
        in_scifi.category = Some(scifi.id.clone());
        let book = client.add_book(in_scifi).await.unwrap();
        settle().await;

        remote.set_reachable(false);
        client.network_down().await;
        client.delete_category("fiction").await.unwrap();

        // One book reassignment plus two category deletes.
        assert_eq!(client.pending_operations().await, 3);
        assert_eq!(client.book(&book.id).await.unwrap().category, UNCATEGORIZED_ID);
        assert_eq!(remote.record_count(TargetCollection::Categories), 4);

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        assert_eq!(client.pending_operations().await, 0);
        assert_eq!(remote.record_count(TargetCollection::Categories), 2);
        let stored = remote.record(TargetCollection::Books, &book.id).unwrap();
        assert_eq!(stored["category"], "uncategorized");
    }

    #[tokio::test]
    async fn test_offline_subtree_replays_with_reconciled_parents() {
        let (remote, _storage, client) = connected_client().await;

        remote.set_reachable(false);
        client.network_down().await;

        let poetry = client
            .add_category(NewCategory::root("Poetry"))
            .await
            .unwrap();
        assert!(poetry.id.starts_with("local-"));
        let haiku = client
            .add_category(NewCategory::child_of("Haiku", poetry.id.clone()))
            .await
            .unwrap();
        assert_eq!(haiku.path, "/Poetry/Haiku");
        assert_eq!(client.pending_operations().await, 2);

        remote.set_reachable(true);
        client.network_up().await;
        settle().await;

        // Both adds replayed under fresh remote ids, and the child's
        // parent pointer follows the parent's new id.
        assert_eq!(client.pending_operations().await, 0);
        let categories = client.categories().await;
        let parent = categories.iter().find(|c| c.name == "Poetry").unwrap();
        let child = categories.iter().find(|c| c.name == "Haiku").unwrap();
        assert!(!parent.id.starts_with("local-"));
        assert_ne!(parent.id, poetry.id);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.path, "/Poetry/Haiku");
        assert_eq!(child.level, 1);

        let stored = remote
            .record(TargetCollection::Categories, &child.id)
            .unwrap();
        assert_eq!(stored["parentId"], parent.id.as_str());
    }

    #[tokio::test]
    async fn test_category_forest_reflects_the_hierarchy() {
        let (_remote, _storage, client) = connected_client().await;
        let scifi = client
            .add_category(NewCategory::child_of("Sci-Fi", "fiction"))
            .await
            .unwrap();

        let forest = client.category_forest().await;
        assert_eq!(forest.len(), 3);
        let fiction = forest
            .iter()
            .find(|node| node.category.id == "fiction")
            .unwrap();
        assert_eq!(fiction.children.len(), 1);
        assert_eq!(fiction.children[0].category.id, scifi.id);
    }
}
