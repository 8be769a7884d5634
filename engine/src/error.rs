//! Error types for the Shelfsync engine.

use crate::{BookId, CategoryId};
use thiserror::Error;

/// All possible errors from the Shelfsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("category not found: {0}")]
    CategoryNotFound(CategoryId),

    #[error("book not found: {0}")]
    BookNotFound(BookId),

    // Tree invariant violations
    #[error("category '{name}' already exists under the same parent")]
    DuplicateSibling { name: String },

    #[error("category too deep: level {level} exceeds maximum {max}")]
    DepthExceeded { level: u8, max: u8 },

    #[error("cannot move '{0}' under itself or one of its descendants")]
    CycleDetected(CategoryId),

    #[error("category '{0}' is reserved and cannot be changed or deleted")]
    ReservedCategory(CategoryId),

    // Validation errors
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid isbn: {0}")]
    InvalidIsbn(String),

    #[error("a book with isbn {0} already exists")]
    DuplicateIsbn(String),

    // Serialization errors
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
