//! # Shelfsync Engine
//!
//! Deterministic core of an offline-tolerant book catalogue.
//!
//! This crate holds the pure logic of the sync engine: catalogue
//! mirrors, the category hierarchy, the offline operation queue's wire
//! format, retry backoff, and last-write-wins conflict resolution. The
//! same inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or clocks
//! - **Deterministic**: same inputs always produce same outputs
//! - **Plans, not effects**: mutations are validated here and expressed
//!   as plans; executing them against a store is the caller's job
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Catalogues
//!
//! [`BookCatalog`] and [`CategoryCatalog`] are in-memory mirrors of the
//! remote collections, keyed by id. They serialize to ordered JSON
//! arrays for snapshot persistence.
//!
//! ### The category tree
//!
//! Categories form a hierarchy through `parent_id` references only; no
//! child lists are stored. [`CategoryTree`] borrows a catalogue and
//! enforces the structural invariants: names unique within a sibling
//! set, levels bounded by [`MAX_LEVEL`], no cycles, and a reserved
//! [`UNCATEGORIZED_ID`] root that cannot be renamed, moved, or deleted.
//! Renames, reparents, and cascading deletes come back as plans
//! ([`PathUpdate`] lists, [`CascadePlan`]) for the caller to execute.
//!
//! ### Offline operations
//!
//! Writes made while disconnected are captured as [`QueuedOperation`]s,
//! serialized FIFO. The engine defines the wire format and the temp-id
//! retargeting used when a replayed add comes back with a server id.
//!
//! ### Conflict resolution
//!
//! [`resolve`](conflict::resolve) implements last-write-wins on
//! `updatedAt` with a field-level merge on ties that keeps the longer
//! local text.
//!
//! ## Quick Start
//!
//! ```rust
//! use shelfsync_engine::{default_categories, Category, CategoryCatalog, CategoryTree, NewCategory};
//!
//! // 1. Start from the seeded defaults
//! let mut categories = CategoryCatalog::new();
//! for category in default_categories(1_706_745_600_000) {
//!     categories.upsert(category);
//! }
//!
//! // 2. Validate a new child against the tree invariants
//! let (level, path) = {
//!     let tree = CategoryTree::new(&categories);
//!     tree.validate_create("Sci-Fi", Some("fiction")).unwrap()
//! };
//! categories.upsert(Category::new(
//!     "scifi",
//!     NewCategory::child_of("Sci-Fi", "fiction"),
//!     level,
//!     path,
//!     1_706_745_600_000,
//! ));
//!
//! // 3. Derived views stay consistent with the flat mirror
//! let tree = CategoryTree::new(&categories);
//! assert_eq!(categories.get("scifi").unwrap().path, "/Fiction/Sci-Fi");
//! assert_eq!(tree.level_of("scifi").unwrap(), 1);
//! assert_eq!(tree.descendants_of("fiction").len(), 1);
//! ```
//!
//! ## Persistence
//!
//! Use [`BookCatalog::encode`]/[`BookCatalog::decode`] (and the
//! category equivalents) plus [`encode_queue`]/[`decode_queue`] for
//! snapshot persistence. Output ordering is deterministic.

pub mod appearance;
pub mod book;
pub mod catalog;
pub mod category;
pub mod conflict;
pub mod error;
pub mod isbn;
pub mod queue;
pub mod sync;
pub mod tree;

// Re-export main types at crate root
pub use appearance::{color_for, icon_for, DEFAULT_ICON};
pub use book::{Book, BookPatch, NewBook};
pub use catalog::{BookCatalog, CategoryCatalog};
pub use category::{
    default_categories, Category, CategoryPatch, NewCategory, MAX_LEVEL, UNCATEGORIZED_ID,
};
pub use conflict::{merge_records, modified_at, resolve, ConflictOutcome, Resolution};
pub use error::{Error, Result};
pub use queue::{decode_queue, encode_queue, OperationKind, QueuedOperation, TargetCollection};
pub use sync::{BackoffPolicy, SyncState, SyncStatus};
pub use tree::{CascadePlan, CategoryNode, CategoryTree, PathUpdate};

/// Type aliases for clarity
pub type BookId = String;
pub type CategoryId = String;
pub type OperationId = String;
pub type Timestamp = u64;
