//! Error taxonomy shared by every layer of the store.

use std::io;

use thiserror::Error;

use crate::schema::SemanticType;
use crate::types::{ElementId, ElementKind};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors surfaced by the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A field is already mapped with a different type.
    #[error("field '{field}' of {kind} is already mapped as {existing}, cannot remap as {requested}")]
    SchemaConflict {
        /// Element kind owning the mapping.
        kind: ElementKind,
        /// Field name.
        field: String,
        /// Type the field was first mapped with.
        existing: SemanticType,
        /// Type the caller asked for.
        requested: SemanticType,
    },
    /// Another live element already carries the user id.
    #[error("user id '{0}' already exists")]
    DuplicateUserId(String),
    /// A query named a key that is not searchable.
    #[error("key '{key}' is not indexed for {kind}")]
    KeyNotIndexed {
        /// Element kind queried.
        kind: ElementKind,
        /// Property key queried.
        key: String,
    },
    /// The element kind already has an automatic index.
    #[error("an automatic index already exists for {0}")]
    IndexExists(ElementKind),
    /// No index is registered under the name.
    #[error("index '{0}' not found")]
    IndexNotFound(String),
    /// The element does not exist or was deleted.
    #[error("{kind} {id} not found")]
    ElementNotFound {
        /// Expected element kind.
        kind: ElementKind,
        /// Internal id looked up.
        id: ElementId,
    },
    /// A value does not fit the field's semantic type.
    #[error("value for field '{field}' cannot be encoded as {expected}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Mapped type of the field.
        expected: SemanticType,
    },
    /// The property name is reserved for the store.
    #[error("property '{0}' is reserved")]
    ReservedProperty(String),
    /// Caller error not covered by a more specific variant.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Error raised by the index engine.
    #[error("engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A stored document could not be decoded.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Stored JSON could not be read or written.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The index writer is gone; no further writes are possible.
    #[error("index writer failed, store must be recreated: {0}")]
    WriterFailed(String),
    /// The store was closed.
    #[error("store is closed")]
    Closed,
}

impl GraphError {
    /// Whether the error leaves the engine writer unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GraphError::WriterFailed(_) | GraphError::Engine(tantivy::TantivyError::ErrorInThread(_))
        )
    }
}
