//! Book operations on the [`SyncClient`] façade.
//!
//! All writes are offline-first: the mirror and the local fallback
//! snapshot change before the remote store is attempted, and a transport
//! failure leaves the operation queued instead of losing it.

use crate::client::{fresh_record_id, now_ms, SyncClient};
use crate::sync::{stamped, WriteOp};
use crate::Result;
use shelfsync_engine::{isbn, Book, BookPatch, Error, NewBook, TargetCollection};

impl SyncClient {
    /// Add a book. The draft is validated, its ISBN normalized and
    /// checked against the catalogue, and the record created under a
    /// locally generated id; while offline that id is a `local-`
    /// temporary reconciled by the next drain.
    pub async fn add_book(&self, mut draft: NewBook) -> Result<Book> {
        draft.validate()?;

        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        if let Some(raw) = &draft.isbn {
            let normalized = isbn::checked(raw)?;
            if state.books.find_by_isbn(&normalized).is_some() {
                return Err(Error::DuplicateIsbn(normalized).into());
            }
            draft.isbn = Some(normalized);
        }
        if let Some(category) = &draft.category {
            if !state.categories.contains(category) {
                return Err(Error::CategoryNotFound(category.clone()).into());
            }
        }

        let book = Book::new(fresh_record_id(state), draft, now_ms());
        let record = book.to_value()?;
        state.books.upsert(book.clone());
        self.inner.persist_books(state)?;
        self.inner.publish_books(state);

        self.inner
            .commit_all(
                state,
                vec![WriteOp::Add {
                    collection: TargetCollection::Books,
                    record_id: book.id.clone(),
                    record,
                }],
            )
            .await?;

        tracing::info!(book = %book.id, title = %book.title, "book added");
        Ok(book)
    }

    /// Apply a partial update to a book. An empty patch is a no-op that
    /// returns the current record.
    pub async fn update_book(&self, id: &str, mut patch: BookPatch) -> Result<Book> {
        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        if patch.is_empty() {
            return match state.books.get(id) {
                Some(book) => Ok(book.clone()),
                None => Err(Error::BookNotFound(id.to_string()).into()),
            };
        }

        if let Some(raw) = &patch.isbn {
            let normalized = isbn::checked(raw)?;
            if let Some(existing) = state.books.find_by_isbn(&normalized) {
                if existing.id != id {
                    return Err(Error::DuplicateIsbn(normalized).into());
                }
            }
            patch.isbn = Some(normalized);
        }
        if let Some(category) = &patch.category {
            if !state.categories.contains(category) {
                return Err(Error::CategoryNotFound(category.clone()).into());
            }
        }

        let now = now_ms();
        let book = state
            .books
            .get_mut(id)
            .ok_or_else(|| Error::BookNotFound(id.to_string()))?;
        book.apply(&patch, now);
        let updated = book.clone();

        self.inner.persist_books(state)?;
        self.inner.publish_books(state);

        self.inner
            .commit_all(
                state,
                vec![WriteOp::Update {
                    collection: TargetCollection::Books,
                    record_id: updated.id.clone(),
                    patch: stamped(patch.to_value()?, now),
                }],
            )
            .await?;

        tracing::info!(book = %updated.id, "book updated");
        Ok(updated)
    }

    /// Delete a book.
    pub async fn delete_book(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let state = &mut *state;

        if state.books.remove(id).is_none() {
            return Err(Error::BookNotFound(id.to_string()).into());
        }

        self.inner.persist_books(state)?;
        self.inner.publish_books(state);

        self.inner
            .commit_all(
                state,
                vec![WriteOp::Delete {
                    collection: TargetCollection::Books,
                    record_id: id.to_string(),
                }],
            )
            .await?;

        tracing::info!(book = %id, "book deleted");
        Ok(())
    }
}
