//! Category operations on the [`SyncClient`] façade.
//!
//! Structural changes go through [`CategoryTree`] plans: the tree
//! validates and computes which records move, the client applies the
//! plan to the mirror and commits one remote step per touched record.
//! Because paths embed ancestor names, renames and reparents fan out to
//! every descendant.

use crate::client::{fresh_record_id, now_ms, SyncClient};
use crate::sync::{stamped, WriteOp};
use crate::Result;
use serde_json::json;
use shelfsync_engine::{
    BookPatch, Category, CategoryPatch, CategoryTree, Error, NewCategory, TargetCollection,
    UNCATEGORIZED_ID,
};

impl SyncClient {
    /// Create a category under the given parent (or as a root).
    pub async fn add_category(&self, draft: NewCategory) -> Result<Category> {
        draft.validate()?;

        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        let (level, path) = {
            let tree = CategoryTree::new(&state.categories);
            tree.validate_create(&draft.name, draft.parent_id.as_deref())?
        };

        let category = Category::new(fresh_record_id(state), draft, level, path, now_ms());
        let record = category.to_value()?;
        state.categories.upsert(category.clone());
        self.inner.persist_categories(state)?;
        self.inner.publish_categories(state);

        self.inner
            .commit_all(
                state,
                vec![WriteOp::Add {
                    collection: TargetCollection::Categories,
                    record_id: category.id.clone(),
                    record,
                }],
            )
            .await?;

        tracing::info!(category = %category.id, name = %category.name, "category added");
        Ok(category)
    }

    /// Rename a category and/or change its description. A rename
    /// recomputes the paths of the whole subtree.
    pub async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        let current = state
            .categories
            .get(id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if current.is_reserved() {
            return Err(Error::ReservedCategory(id.to_string()).into());
        }
        if patch.name.is_none() && patch.description.is_none() {
            return Ok(current.clone());
        }

        let now = now_ms();
        let mut steps: Vec<WriteOp> = Vec::new();

        if let Some(new_name) = &patch.name {
            let updates = {
                let tree = CategoryTree::new(&state.categories);
                tree.rename_plan(id, new_name)?
            };
            let trimmed = new_name.trim().to_string();

            for update in &updates {
                let Some(category) = state.categories.get_mut(&update.id) else {
                    continue;
                };
                if update.id == id {
                    category.name = trimmed.clone();
                    if let Some(description) = &patch.description {
                        category.description = Some(description.clone());
                    }
                }
                category.path = update.path.clone();
                category.level = update.level;
                category.updated_at = now;
            }

            for update in &updates {
                let payload = if update.id == id {
                    let mut fields = json!({
                        "name": trimmed,
                        "path": update.path,
                        "level": update.level,
                    });
                    if let Some(description) = &patch.description {
                        fields["description"] = json!(description);
                    }
                    fields
                } else {
                    json!({ "path": update.path, "level": update.level })
                };
                steps.push(WriteOp::Update {
                    collection: TargetCollection::Categories,
                    record_id: update.id.clone(),
                    patch: stamped(payload, now),
                });
            }
        } else if let Some(description) = &patch.description {
            if let Some(category) = state.categories.get_mut(id) {
                category.description = Some(description.clone());
                category.updated_at = now;
            }
            steps.push(WriteOp::Update {
                collection: TargetCollection::Categories,
                record_id: id.to_string(),
                patch: stamped(json!({ "description": description }), now),
            });
        }

        let updated = state
            .categories
            .get(id)
            .cloned()
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;

        self.inner.persist_categories(state)?;
        self.inner.publish_categories(state);
        self.inner.commit_all(state, steps).await?;

        tracing::info!(category = %id, "category updated");
        Ok(updated)
    }

    /// Move a category under a new parent (or to the root). Levels and
    /// paths of the whole subtree are recomputed.
    pub async fn reparent_category(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Category> {
        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        let updates = {
            let tree = CategoryTree::new(&state.categories);
            tree.reparent_plan(id, new_parent_id)?
        };

        let now = now_ms();
        if let Some(category) = state.categories.get_mut(id) {
            category.parent_id = new_parent_id.map(str::to_string);
        }
        for update in &updates {
            if let Some(category) = state.categories.get_mut(&update.id) {
                category.path = update.path.clone();
                category.level = update.level;
                category.updated_at = now;
            }
        }

        let mut steps = Vec::with_capacity(updates.len());
        for update in &updates {
            let payload = if update.id == id {
                json!({
                    "parentId": new_parent_id,
                    "path": update.path,
                    "level": update.level,
                })
            } else {
                json!({ "path": update.path, "level": update.level })
            };
            steps.push(WriteOp::Update {
                collection: TargetCollection::Categories,
                record_id: update.id.clone(),
                patch: stamped(payload, now),
            });
        }

        let moved = state
            .categories
            .get(id)
            .cloned()
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;

        self.inner.persist_categories(state)?;
        self.inner.publish_categories(state);
        self.inner.commit_all(state, steps).await?;

        tracing::info!(category = %id, parent = ?new_parent_id, "category reparented");
        Ok(moved)
    }

    /// Delete a category and every descendant. Books belonging to any
    /// deleted category move to the reserved root first, so a cascade
    /// interrupted by a connection loss replays in a safe order.
    pub async fn delete_category(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        let plan = {
            let tree = CategoryTree::new(&state.categories);
            tree.cascade_plan(id, &state.books)?
        };

        let now = now_ms();
        let mut steps: Vec<WriteOp> = Vec::with_capacity(plan.books.len() + plan.categories.len());

        for book_id in &plan.books {
            if let Some(book) = state.books.get_mut(book_id) {
                book.apply(&BookPatch::recategorize(UNCATEGORIZED_ID), now);
            }
            steps.push(WriteOp::Update {
                collection: TargetCollection::Books,
                record_id: book_id.clone(),
                patch: stamped(json!({ "category": UNCATEGORIZED_ID }), now),
            });
        }
        for category_id in &plan.categories {
            state.categories.remove(category_id);
            steps.push(WriteOp::Delete {
                collection: TargetCollection::Categories,
                record_id: category_id.clone(),
            });
        }

        self.inner.persist_snapshots(state)?;
        self.inner.publish_books(state);
        self.inner.publish_categories(state);
        self.inner.commit_all(state, steps).await?;

        tracing::info!(
            category = %id,
            categories = plan.categories.len(),
            books = plan.books.len(),
            "category deleted with cascade"
        );
        Ok(())
    }
}
