//! Category tree rules over the flat category mirror.
//!
//! The mirror is the single source of truth; no child pointers are
//! stored. The tree borrows it, validates mutations against the
//! invariants (sibling-unique names, bounded depth, acyclicity) and
//! computes *plans* describing which records have to change. Executing a
//! plan against the remote store and the mirror is the caller's job, so
//! a failed validation trivially leaves the tree unmodified.
//!
//! All traversals are iterative walks over the id map with an on-the-fly
//! parent index. A walk that takes more steps than there are categories
//! bails out with a cycle error instead of looping forever on malformed
//! data.

use crate::{
    BookCatalog, BookId, Category, CategoryCatalog, CategoryId, Error, Result, MAX_LEVEL,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Recomputed position for one category after a rename or reparent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathUpdate {
    /// The category to update
    pub id: CategoryId,
    /// Its new level
    pub level: u8,
    /// Its new path
    pub path: String,
}

/// Everything a cascading category delete has to touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadePlan {
    /// The deleted category and all its descendants
    pub categories: Vec<CategoryId>,
    /// Books to reassign to the reserved root before any deletion
    pub books: Vec<BookId>,
}

/// A materialized node of the presentation forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Tree-shaped rules and views over the flat category mirror.
pub struct CategoryTree<'a> {
    categories: &'a CategoryCatalog,
}

impl<'a> CategoryTree<'a> {
    /// Create a tree view over the given mirror.
    pub fn new(categories: &'a CategoryCatalog) -> Self {
        Self { categories }
    }

    /// Number of ancestors of a category, resolved through the mirror.
    pub fn level_of(&self, id: &str) -> Result<u8> {
        let mut current = self
            .categories
            .get(id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        let mut level = 0usize;
        while let Some(parent_id) = current.parent_id.as_deref() {
            level += 1;
            if level > self.categories.len() {
                return Err(Error::CycleDetected(id.to_string()));
            }
            current = self
                .categories
                .get(parent_id)
                .ok_or_else(|| Error::CategoryNotFound(parent_id.to_string()))?;
        }
        Ok(u8::try_from(level).unwrap_or(u8::MAX))
    }

    /// Level a new node would get under the given parent: 0 for roots,
    /// one past the parent's level otherwise.
    pub fn compute_level(&self, parent_id: Option<&str>) -> Result<u8> {
        match parent_id {
            None => Ok(0),
            Some(parent_id) => Ok(self.level_of(parent_id)?.saturating_add(1)),
        }
    }

    /// Path a node named `name` would get under the given parent.
    /// Ancestor names are resolved through the mirror, never read from a
    /// possibly stale stored path.
    pub fn compute_path(&self, parent_id: Option<&str>, name: &str) -> Result<String> {
        let mut segments: Vec<&str> = vec![name];
        let mut current = parent_id;
        let mut steps = 0usize;
        while let Some(id) = current {
            let category = self
                .categories
                .get(id)
                .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
            segments.push(category.name.as_str());
            steps += 1;
            if steps > self.categories.len() {
                return Err(Error::CycleDetected(id.to_string()));
            }
            current = category.parent_id.as_deref();
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Validate a category creation and return the `(level, path)` the
    /// new node would occupy.
    pub fn validate_create(&self, name: &str, parent_id: Option<&str>) -> Result<(u8, String)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingRequiredField("name".into()));
        }
        if self.has_sibling_named(parent_id, name, None) {
            return Err(Error::DuplicateSibling {
                name: name.to_string(),
            });
        }
        let level = self.compute_level(parent_id)?;
        if level > MAX_LEVEL {
            return Err(Error::DepthExceeded {
                level,
                max: MAX_LEVEL,
            });
        }
        let path = self.compute_path(parent_id, name)?;
        Ok((level, path))
    }

    /// Validate a rename against the node's current sibling set.
    pub fn validate_rename(&self, id: &str, new_name: &str) -> Result<()> {
        let category = self
            .categories
            .get(id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if category.is_reserved() {
            return Err(Error::ReservedCategory(id.to_string()));
        }
        let name = new_name.trim();
        if name.is_empty() {
            return Err(Error::MissingRequiredField("name".into()));
        }
        if self.has_sibling_named(category.parent_id.as_deref(), name, Some(id)) {
            return Err(Error::DuplicateSibling {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Plan a rename: new paths for the node and all its descendants.
    /// Levels do not change, paths do because they embed the name.
    pub fn rename_plan(&self, id: &str, new_name: &str) -> Result<Vec<PathUpdate>> {
        self.validate_rename(id, new_name)?;
        let name = new_name.trim();

        let mut updates = vec![PathUpdate {
            id: id.to_string(),
            level: self.level_of(id)?,
            path: self.path_with_renamed(id, id, name)?,
        }];
        for descendant in self.descendants_of(id) {
            updates.push(PathUpdate {
                id: descendant.id.clone(),
                level: self.level_of(&descendant.id)?,
                path: self.path_with_renamed(&descendant.id, id, name)?,
            });
        }
        Ok(updates)
    }

    /// Plan a reparent: new levels and paths for the node and all its
    /// descendants. Rejects moves under the node itself or one of its
    /// descendants, and moves that would push any subtree node past the
    /// depth limit.
    pub fn reparent_plan(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Vec<PathUpdate>> {
        let category = self
            .categories
            .get(id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if category.is_reserved() {
            return Err(Error::ReservedCategory(id.to_string()));
        }

        let descendants = self.descendants_of(id);
        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Err(Error::CycleDetected(id.to_string()));
            }
            if !self.categories.contains(parent_id) {
                return Err(Error::CategoryNotFound(parent_id.to_string()));
            }
            if descendants.iter().any(|d| d.id == parent_id) {
                return Err(Error::CycleDetected(id.to_string()));
            }
        }

        // Name segments below the moved node, per descendant. The longest
        // one decides how deep the subtree reaches at its new position.
        let mut subtree: Vec<(&Category, Vec<&str>)> = Vec::with_capacity(descendants.len());
        let mut deepest = 0u8;
        for descendant in descendants {
            let suffix = self.suffix_below(id, &descendant.id)?;
            deepest = deepest.max(u8::try_from(suffix.len()).unwrap_or(u8::MAX));
            subtree.push((descendant, suffix));
        }

        let new_level = self.compute_level(new_parent_id)?;
        let target_level = new_level.saturating_add(deepest);
        if target_level > MAX_LEVEL {
            return Err(Error::DepthExceeded {
                level: target_level,
                max: MAX_LEVEL,
            });
        }

        let node_path = self.compute_path(new_parent_id, &category.name)?;
        let mut updates = vec![PathUpdate {
            id: id.to_string(),
            level: new_level,
            path: node_path.clone(),
        }];
        for (descendant, suffix) in subtree {
            updates.push(PathUpdate {
                id: descendant.id.clone(),
                level: new_level.saturating_add(u8::try_from(suffix.len()).unwrap_or(u8::MAX)),
                path: format!("{}/{}", node_path, suffix.join("/")),
            });
        }
        Ok(updates)
    }

    /// All categories transitively parented under `id`, breadth-first,
    /// siblings in name order.
    pub fn descendants_of(&self, id: &str) -> Vec<&'a Category> {
        let children = self.children_index();
        let mut found = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(kids) = children.get(current) {
                for kid in kids {
                    if seen.insert(kid.id.as_str()) {
                        found.push(*kid);
                        queue.push_back(kid.id.as_str());
                    }
                }
            }
        }
        found
    }

    /// Materialize the parent→children forest for presentation. Purely
    /// derived, recomputed on demand. Categories whose parent does not
    /// resolve are attached as roots rather than dropped.
    pub fn build_forest(&self) -> Vec<CategoryNode> {
        let mut roots: Vec<&Category> = Vec::new();
        let mut children: HashMap<&str, Vec<&'a Category>> = HashMap::new();
        for category in self.categories.iter() {
            match category.parent_id.as_deref() {
                Some(parent_id) if self.categories.contains(parent_id) => {
                    children.entry(parent_id).or_default().push(category);
                }
                _ => roots.push(category),
            }
        }
        roots.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        for kids in children.values_mut() {
            kids.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        }

        roots
            .into_iter()
            .map(|root| Self::subtree(root, &children))
            .collect()
    }

    /// Plan a cascading delete: the category, every descendant, and the
    /// books that must move to the reserved root first.
    pub fn cascade_plan(&self, id: &str, books: &BookCatalog) -> Result<CascadePlan> {
        let category = self
            .categories
            .get(id)
            .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
        if category.is_reserved() {
            return Err(Error::ReservedCategory(id.to_string()));
        }

        let mut categories: Vec<CategoryId> = vec![id.to_string()];
        categories.extend(self.descendants_of(id).iter().map(|c| c.id.clone()));

        let doomed: HashSet<&str> = categories.iter().map(String::as_str).collect();
        let mut affected: Vec<BookId> = books
            .iter()
            .filter(|book| doomed.contains(book.category.as_str()))
            .map(|book| book.id.clone())
            .collect();
        affected.sort();

        Ok(CascadePlan {
            categories,
            books: affected,
        })
    }

    fn children_index(&self) -> HashMap<&'a str, Vec<&'a Category>> {
        let mut children: HashMap<&'a str, Vec<&'a Category>> = HashMap::new();
        for category in self.categories.iter() {
            if let Some(parent_id) = category.parent_id.as_deref() {
                children.entry(parent_id).or_default().push(category);
            }
        }
        for kids in children.values_mut() {
            kids.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        }
        children
    }

    /// Ancestor walk for `target` with one node's name overridden, used
    /// to compute post-rename paths without mutating the mirror.
    fn path_with_renamed(&self, target: &str, renamed_id: &str, new_name: &str) -> Result<String> {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = Some(target);
        let mut steps = 0usize;
        while let Some(id) = current {
            let category = self
                .categories
                .get(id)
                .ok_or_else(|| Error::CategoryNotFound(id.to_string()))?;
            segments.push(if id == renamed_id {
                new_name
            } else {
                category.name.as_str()
            });
            steps += 1;
            if steps > self.categories.len() {
                return Err(Error::CycleDetected(id.to_string()));
            }
            current = category.parent_id.as_deref();
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Name segments strictly below `node_id` down to `target`, in path
    /// order. `target` must be a descendant of `node_id`.
    fn suffix_below(&self, node_id: &str, target: &str) -> Result<Vec<&'a str>> {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = target;
        let mut steps = 0usize;
        while current != node_id {
            let category = self
                .categories
                .get(current)
                .ok_or_else(|| Error::CategoryNotFound(current.to_string()))?;
            segments.push(category.name.as_str());
            steps += 1;
            if steps > self.categories.len() {
                return Err(Error::CycleDetected(target.to_string()));
            }
            current = category
                .parent_id
                .as_deref()
                .ok_or_else(|| Error::CategoryNotFound(node_id.to_string()))?;
        }
        segments.reverse();
        Ok(segments)
    }

    fn has_sibling_named(&self, parent_id: Option<&str>, name: &str, exclude: Option<&str>) -> bool {
        self.categories.iter().any(|category| {
            category.parent_id.as_deref() == parent_id
                && category.name == name
                && Some(category.id.as_str()) != exclude
        })
    }

    fn subtree(root: &Category, children: &HashMap<&str, Vec<&'a Category>>) -> CategoryNode {
        // Iterative assembly: collect the subtree in pre-order, then build
        // nodes children-first by walking that order backwards.
        let mut order: Vec<&Category> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&Category> = vec![root];
        while let Some(category) = stack.pop() {
            if !seen.insert(category.id.as_str()) {
                continue;
            }
            order.push(category);
            if let Some(kids) = children.get(category.id.as_str()) {
                stack.extend(kids.iter().rev().copied());
            }
        }

        let mut pending: HashMap<&str, Vec<CategoryNode>> = HashMap::new();
        let mut result = None;
        for category in order.iter().rev() {
            let mut kids = pending.remove(category.id.as_str()).unwrap_or_default();
            kids.reverse();
            let node = CategoryNode {
                category: (*category).clone(),
                children: kids,
            };
            if category.id == root.id {
                result = Some(node);
            } else if let Some(parent_id) = category.parent_id.as_deref() {
                pending.entry(parent_id).or_default().push(node);
            }
        }
        result.unwrap_or_else(|| CategoryNode {
            category: root.clone(),
            children: Vec::new(),
        })
    }
}
