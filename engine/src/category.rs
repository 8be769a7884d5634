//! Category records, the depth limit, and the reserved root.

use crate::{CategoryId, Error, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Id of the reserved root category. It always exists, is never deleted,
/// and receives books whose own category is removed.
pub const UNCATEGORIZED_ID: &str = "uncategorized";

/// Deepest allowed category level (levels run 0 through `MAX_LEVEL`).
pub const MAX_LEVEL: u8 = 4;

/// A node in the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Unique identifier
    pub id: CategoryId,
    /// Display name, unique within its sibling set
    pub name: String,
    /// Parent category id; `None` for roots
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    /// Slash-joined ancestor names ending in this category's own name,
    /// e.g. `/Fiction/Sci-Fi`
    pub path: String,
    /// Number of ancestors; roots are level 0
    pub level: u8,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the category was first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the category was last updated (milliseconds since epoch)
    pub updated_at: Timestamp,
}

impl Category {
    /// Create a category from a validated draft and its computed position.
    pub fn new(
        id: impl Into<CategoryId>,
        draft: NewCategory,
        level: u8,
        path: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            name: draft.name.trim().to_string(),
            parent_id: draft.parent_id,
            path: path.into(),
            level,
            description: draft.description,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// True for the reserved `uncategorized` root.
    pub fn is_reserved(&self) -> bool {
        self.id == UNCATEGORIZED_ID
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

/// Input for creating a category; position is computed by the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCategory {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            description: None,
        }
    }

    pub fn child_of(name: impl Into<String>, parent_id: impl Into<CategoryId>) -> Self {
        Self {
            name: name.into(),
            parent_id: Some(parent_id.into()),
            description: None,
        }
    }

    /// Check required fields. The name must be non-empty after trimming.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingRequiredField("name".into()));
        }
        Ok(())
    }
}

/// Partial update for a category. Renames go through the tree so that
/// descendant paths are recomputed; this only carries the mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The categories seeded on first run: two starter roots plus the
/// reserved `uncategorized` root.
pub fn default_categories(timestamp: Timestamp) -> Vec<Category> {
    [
        ("fiction", "Fiction"),
        ("non-fiction", "Non-Fiction"),
        (UNCATEGORIZED_ID, "Uncategorized"),
    ]
    .into_iter()
    .map(|(id, name)| Category {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: None,
        path: format!("/{name}"),
        level: 0,
        description: Some(format!("Default {name} category")),
        created_at: timestamp,
        updated_at: timestamp,
    })
    .collect()
}
