//! # Collection Boundary
//!
//! What a program needs from any backing store, native table or foreign:
//! - `count`: number of rows
//! - `copy`: serialize one row as a record onto a worker's scratch stack
//! - `mutate`: apply one committed record back into the store
//!
//! Records are self-describing (see [`record`]), so a collection never needs
//! to know which pipeline produced them.

pub mod record;
mod table_collection;

use std::sync::Arc;

use parking_lot::RwLock;
use radiance_core::{RadianceResult, ScratchStack};

pub use record::{Component, RecordHeader};
pub use table_collection::TableCollection;

/// A store a program can read rows from and commit rows into.
///
/// `copy` runs concurrently from many workers under a shared lock; `mutate`
/// runs sequentially under an exclusive lock.
pub trait Collection: Send + Sync {
    /// Number of rows.
    fn count(&self) -> u64;

    /// Pushes a record of row `row` onto `scratch`.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if the row is out of range, `MemoryOutOfBounds` if the
    /// record does not fit.
    fn copy(&self, row: u64, scratch: &mut ScratchStack) -> RadianceResult<()>;

    /// Applies one record.
    ///
    /// # Errors
    ///
    /// `IncompatibleDataTypes` for a record of another family or size,
    /// `DoesNotExist` if its target row is not live.
    fn mutate(&mut self, record: &[u8]) -> RadianceResult<()>;
}

/// A shared, lockable collection.
pub type CollectionRef = Arc<RwLock<dyn Collection>>;
