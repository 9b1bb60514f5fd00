//! # Mutation Buffer
//!
//! Deferred table changes requested during a parallel pass.
//!
//! Producers push from any worker thread without locking. The buffer is
//! drained and applied sequentially by `flush`, which must only run between
//! passes over the target table.

use crossbeam_queue::SegQueue;

use crate::error::{RadianceError, RadianceResult};
use crate::storage::{Element, Table};

use std::hash::Hash;

/// Kind of a buffered mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MutateBy {
    /// Insert a new row.
    Insert = 1,
    /// Remove a row by key.
    Remove = 2,
    /// Write a value back by identity.
    Write = 3,
}

impl TryFrom<u32> for MutateBy {
    type Error = RadianceError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Insert),
            2 => Ok(Self::Remove),
            3 => Ok(Self::Write),
            other => Err(RadianceError::IncompatibleDataTypes(format!(
                "unknown mutation kind {other}"
            ))),
        }
    }
}

/// One pending change to a table.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation<K, V> {
    /// Insert `(key, value)`.
    Insert {
        /// Key of the new row.
        key: K,
        /// Value of the new row.
        value: V,
    },
    /// Remove the row owning `key`.
    Remove {
        /// Key of the row to remove.
        key: K,
    },
    /// Write an element back to the row its identity resolves to.
    Write(Element<K, V>),
}

impl<K, V> Mutation<K, V> {
    /// The kind tag.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MutateBy {
        match self {
            Self::Insert { .. } => MutateBy::Insert,
            Self::Remove { .. } => MutateBy::Remove,
            Self::Write(_) => MutateBy::Write,
        }
    }
}

/// Applies a mutation with its plain meaning.
///
/// - `Insert` inserts (an existing key is overwritten)
/// - `Remove` removes the row currently owning the key
/// - `Write` commits the element exactly as a direct writer would
///
/// # Errors
///
/// `DoesNotExist` if a `Remove` key or a `Write` identity is not live.
pub fn resolve_default<K, V>(table: &mut Table<K, V>, mutation: Mutation<K, V>) -> RadianceResult<()>
where
    K: Clone + Eq + Hash,
{
    match mutation {
        Mutation::Insert { key, value } => {
            table.insert(key, value);
            Ok(())
        }
        Mutation::Remove { key } => {
            let handle = table
                .find(&key)
                .ok_or_else(|| RadianceError::missing("key of buffered remove"))?;
            table.remove(handle).map(|_| ())
        }
        Mutation::Write(element) => table.commit(element),
    }
}

/// Counts from one flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Mutations the resolver accepted.
    pub applied: usize,
    /// Mutations the resolver rejected.
    pub rejected: usize,
}

impl FlushStats {
    /// Combines the counts of two flushes.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            applied: self.applied + other.applied,
            rejected: self.rejected + other.rejected,
        }
    }
}

/// Lock-free queue of pending mutations against one table.
pub struct MutationBuffer<K, V> {
    queue: SegQueue<Mutation<K, V>>,
}

impl<K, V> Default for MutationBuffer<K, V> {
    fn default() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }
}

impl<K, V> std::fmt::Debug for MutationBuffer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationBuffer")
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl<K, V> MutationBuffer<K, V> {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a mutation. Safe from any number of threads.
    #[inline]
    pub fn push(&self, mutation: Mutation<K, V>) {
        self.queue.push(mutation);
    }

    /// Queues an insert.
    #[inline]
    pub fn insert(&self, key: K, value: V) {
        self.push(Mutation::Insert { key, value });
    }

    /// Queues a remove by key.
    #[inline]
    pub fn remove(&self, key: K) {
        self.push(Mutation::Remove { key });
    }

    /// Queues a write-back.
    #[inline]
    pub fn write(&self, element: Element<K, V>) {
        self.push(Mutation::Write(element));
    }

    /// Number of queued mutations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Checks if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drains the buffer into `table` with [`resolve_default`].
    pub fn flush(&self, table: &mut Table<K, V>) -> FlushStats
    where
        K: Clone + Eq + Hash,
    {
        self.flush_with(table, resolve_default)
    }

    /// Drains the buffer into `table` with a custom resolver.
    ///
    /// Every mutation queued before the call is handed to the resolver once,
    /// in queue order. Mutations pushed while flushing wait for the next flush.
    pub fn flush_with<R>(&self, table: &mut Table<K, V>, mut resolver: R) -> FlushStats
    where
        R: FnMut(&mut Table<K, V>, Mutation<K, V>) -> RadianceResult<()>,
    {
        let mut stats = FlushStats::default();
        for _ in 0..self.queue.len() {
            let Some(mutation) = self.queue.pop() else {
                break;
            };
            match resolver(table, mutation) {
                Ok(()) => stats.applied += 1,
                Err(error) => {
                    stats.rejected += 1;
                    tracing::trace!(%error, "buffered mutation rejected");
                }
            }
        }
        tracing::debug!(
            applied = stats.applied,
            rejected = stats.rejected,
            "mutation buffer flushed"
        );
        stats
    }
}
