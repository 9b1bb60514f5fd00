//! # View
//!
//! Read-only table façade.

use std::hash::Hash;

use super::handle::Handle;
use super::table::{RowIndex, Table};

/// Borrowed, read-only access to a [`Table`].
///
/// A view cannot outlive its table and exposes no structural operations, so
/// any number of views may be read from concurrently.
pub struct View<'a, K, V> {
    table: &'a Table<K, V>,
}

impl<K, V> Clone for View<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for View<'_, K, V> {}

impl<'a, K: Clone + Eq + Hash, V> View<'a, K, V> {
    /// Creates a view over `table`.
    #[inline]
    #[must_use]
    pub fn new(table: &'a Table<K, V>) -> Self {
        Self { table }
    }

    /// Looks up the handle owning `key`.
    #[inline]
    #[must_use]
    pub fn find(&self, key: &K) -> Option<Handle> {
        self.table.find(key)
    }

    /// Key at a physical row.
    #[inline]
    #[must_use]
    pub fn key(&self, row: usize) -> Option<&'a K> {
        self.table.key(row)
    }

    /// Value at a physical row.
    #[inline]
    #[must_use]
    pub fn value(&self, row: usize) -> Option<&'a V> {
        self.table.value(row)
    }

    /// Value behind a live handle.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&'a V> {
        self.table.get(handle)
    }

    /// Number of live rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Checks if the backing table has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The key column.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &'a [K] {
        self.table.keys()
    }

    /// The value column.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &'a [V] {
        self.table.values()
    }

    /// Identity lookups over the backing table.
    #[inline]
    #[must_use]
    pub fn rows(&self) -> RowIndex<'a, K> {
        self.table.rows()
    }
}
