//! Book records and their validation.

use crate::{BookId, CategoryId, Error, Result, Timestamp, UNCATEGORIZED_ID};
use serde::{Deserialize, Serialize};

/// A catalogued book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Unique identifier, assigned by the remote store or a temporary
    /// local id until the first successful sync
    pub id: BookId,
    /// Book title (required)
    pub title: String,
    /// Author name (required)
    pub author: String,
    /// Owning category id; the reserved `uncategorized` root when unset
    pub category: CategoryId,
    /// Cover image url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Normalized ISBN-10 or ISBN-13
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the book was first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the book was last updated (milliseconds since epoch)
    pub updated_at: Timestamp,
}

impl Book {
    /// Create a book from a validated draft.
    pub fn new(id: impl Into<BookId>, draft: NewBook, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            title: draft.title.trim().to_string(),
            author: draft.author.trim().to_string(),
            category: draft
                .category
                .unwrap_or_else(|| UNCATEGORIZED_ID.to_string()),
            cover: draft.cover,
            isbn: draft.isbn,
            description: draft.description,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Apply a partial update, stamping `updated_at`.
    pub fn apply(&mut self, patch: &BookPatch, timestamp: Timestamp) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(author) = &patch.author {
            self.author = author.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(cover) = &patch.cover {
            self.cover = Some(cover.clone());
        }
        if let Some(isbn) = &patch.isbn {
            self.isbn = Some(isbn.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        self.updated_at = timestamp;
    }

    /// Serialize into the JSON shape stored remotely.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from the JSON shape stored remotely.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Input for creating a book; `id` and timestamps are assigned later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewBook {
    /// Check required fields. Title and author must be non-empty after
    /// trimming.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::MissingRequiredField("title".into()));
        }
        if self.author.trim().is_empty() {
            return Err(Error::MissingRequiredField("author".into()));
        }
        Ok(())
    }
}

/// Partial update for a book; only set fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BookPatch {
    /// Patch that only moves the book to another category.
    pub fn recategorize(category: impl Into<CategoryId>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.category.is_none()
            && self.cover.is_none()
            && self.isbn.is_none()
            && self.description.is_none()
    }

    /// Serialize into the partial JSON sent to the remote store.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}
