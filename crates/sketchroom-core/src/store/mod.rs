//! Shared shape store.
//!
//! The store maps shape identity to the whole shape value. Every write
//! replaces the entire value for its key; there is no field-level merge.

mod replica;

pub use replica::{ReplicatedStore, ORDER_KEY, SHAPES_KEY};

use crate::shapes::{Shape, ShapeId};
use thiserror::Error;

/// Errors from shape store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Replica error: {0}")]
    Replica(#[from] loro::LoroError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Shape {shape} stored under mismatched key {key}")]
    IdentityMismatch { key: ShapeId, shape: ShapeId },
}

/// How concurrent writes to the same key are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictPolicy {
    /// The write ordered last by the replication backend replaces the whole
    /// value. Concurrent edits to different fields of one shape do not merge:
    /// one of the two values survives intact on every peer.
    LastWriteWins,
}

/// Keyed storage for shapes, shared by all participants.
pub trait ShapeStore {
    /// Look up a shape. Entries that fail to decode read as absent.
    fn get(&self, id: &ShapeId) -> Option<Shape>;

    /// Store `shape` under `id`, replacing any previous value.
    ///
    /// Returns `Ok(false)` when the stored value is already identical, in
    /// which case nothing is written.
    fn put(&mut self, id: ShapeId, shape: &Shape) -> Result<bool, StoreError>;

    /// Remove a shape. Returns `Ok(false)` if it was not present.
    fn delete(&mut self, id: &ShapeId) -> Result<bool, StoreError>;

    /// Remove every shape. Clearing an empty store writes nothing.
    fn clear(&mut self) -> Result<(), StoreError>;

    /// All shapes, bottom to top in creation order.
    fn entries(&self) -> Vec<Shape>;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &ShapeId) -> bool {
        self.get(id).is_some()
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::LastWriteWins
    }
}
