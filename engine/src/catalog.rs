//! In-memory mirrors of the two remote collections.
//!
//! Catalogs are owned, explicitly scoped containers. Change subscriptions
//! replace their contents wholesale; the write path updates them
//! optimistically while offline. They also round-trip to the JSON array
//! snapshots kept in durable local storage as an offline fallback.

use crate::{Book, BookId, Category, CategoryId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mirror of the remote `books` collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCatalog {
    books: HashMap<BookId, Book>,
}

impl BookCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
        }
    }

    /// Get a book by id.
    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.get(id)
    }

    /// Get a mutable book by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Book> {
        self.books.get_mut(id)
    }

    /// Insert or replace a book.
    pub fn upsert(&mut self, book: Book) {
        self.books.insert(book.id.clone(), book);
    }

    /// Remove a book, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<Book> {
        self.books.remove(id)
    }

    /// Replace the book's id, keeping the record otherwise intact.
    /// Used when a remote store assigns the permanent id for a record
    /// created offline under a temporary one.
    pub fn rekey(&mut self, old_id: &str, new_id: impl Into<BookId>) -> bool {
        match self.books.remove(old_id) {
            Some(mut book) => {
                book.id = new_id.into();
                self.upsert(book);
                true
            }
            None => false,
        }
    }

    /// Check if a book exists.
    pub fn contains(&self, id: &str) -> bool {
        self.books.contains_key(id)
    }

    /// Number of books.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Iterate over all books in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    /// Books sorted newest-first, ties broken by id for determinism.
    pub fn by_created_desc(&self) -> Vec<&Book> {
        let mut books: Vec<&Book> = self.books.values().collect();
        books.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        books
    }

    /// Find a book carrying the given ISBN.
    pub fn find_by_isbn(&self, isbn: &str) -> Option<&Book> {
        self.books
            .values()
            .find(|b| b.isbn.as_deref() == Some(isbn))
    }

    /// Replace the whole mirror with an authoritative snapshot.
    pub fn replace_all(&mut self, books: Vec<Book>) {
        self.books = books.into_iter().map(|b| (b.id.clone(), b)).collect();
    }

    /// Encode as the JSON array snapshot kept in local storage.
    pub fn encode(&self) -> Result<String> {
        let ordered: Vec<&Book> = self.by_created_desc();
        serde_json::to_string(&ordered).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a JSON array snapshot from local storage.
    pub fn decode(raw: &str) -> Result<Self> {
        let books: Vec<Book> =
            serde_json::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut catalog = Self::new();
        catalog.replace_all(books);
        Ok(catalog)
    }
}

/// Mirror of the remote `categories` collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCatalog {
    categories: HashMap<CategoryId, Category>,
}

impl CategoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            categories: HashMap::new(),
        }
    }

    /// Get a category by id.
    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Get a mutable category by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.categories.get_mut(id)
    }

    /// Insert or replace a category.
    pub fn upsert(&mut self, category: Category) {
        self.categories.insert(category.id.clone(), category);
    }

    /// Remove a category, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<Category> {
        self.categories.remove(id)
    }

    /// Check if a category exists.
    pub fn contains(&self, id: &str) -> bool {
        self.categories.contains_key(id)
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Iterate over all categories in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Categories sorted by name, ties broken by id.
    pub fn by_name_asc(&self) -> Vec<&Category> {
        let mut categories: Vec<&Category> = self.categories.values().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        categories
    }

    /// Replace the whole mirror with an authoritative snapshot.
    pub fn replace_all(&mut self, categories: Vec<Category>) {
        self.categories = categories.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    /// Encode as the JSON array snapshot kept in local storage.
    pub fn encode(&self) -> Result<String> {
        let ordered: Vec<&Category> = self.by_name_asc();
        serde_json::to_string(&ordered).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a JSON array snapshot from local storage.
    pub fn decode(raw: &str) -> Result<Self> {
        let categories: Vec<Category> =
            serde_json::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut catalog = Self::new();
        catalog.replace_all(categories);
        Ok(catalog)
    }
}
