//! # Columnar Table
//!
//! Dense, parallel key/value columns with a handle indirection layer.
//!
//! The table uses a swap-remove strategy:
//! - Rows are packed contiguously (cache-friendly iteration)
//! - Removal swaps the last row into the hole and pops, O(1)
//! - Handles go through a slot array so they survive relocation

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use super::handle::{Element, Handle, RowId};
use super::view::View;
use crate::error::{RadianceError, RadianceResult};

/// Row index stored in a slot whose handle is currently free.
const VACANT: usize = usize::MAX;

/// Handle slot: where the row lives now, and which generation owns it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    row: usize,
    generation: u32,
}

/// A table shared between pipelines and the code that owns it.
pub type SharedTable<K, V> = Arc<RwLock<Table<K, V>>>;

/// Authoritative columnar store of `(key, value)` rows.
///
/// After every public operation:
/// - `keys.len() == values.len()` is the number of live rows
/// - every live handle's slot points at a row whose key maps back to it
/// - every live row's key maps to a handle whose slot points at that row
///
/// # Example
///
/// ```rust,ignore
/// let mut table: Table<u32, f32> = Table::new();
/// let handle = table.insert(7, 1.0);
/// assert_eq!(table.find(&7), Some(handle));
/// assert_eq!(table.get(handle), Some(&1.0));
/// ```
pub struct Table<K, V> {
    /// Key column.
    keys: Vec<K>,
    /// Value column, row `i` belongs with `keys[i]`.
    values: Vec<V>,
    /// Handle slot -> current row.
    slots: Vec<Slot>,
    /// Recycled slot indices (LIFO).
    free_handles: Vec<u32>,
    /// Key -> owning handle.
    index: HashMap<K, Handle>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            slots: Vec::new(),
            free_handles: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash, V> Table<K, V> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free_handles: Vec::new(),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Builds a table by inserting every row in order.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let rows = rows.into_iter();
        let mut table = Self::with_capacity(rows.size_hint().0);
        for (key, value) in rows {
            table.insert(key, value);
        }
        table
    }

    /// Wraps the table for sharing with pipelines.
    #[must_use]
    pub fn into_shared(self) -> SharedTable<K, V> {
        Arc::new(RwLock::new(self))
    }

    /// Number of live rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Checks if the table has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Inserts a row, returning its handle.
    ///
    /// Inserting a key that is already live replaces its value in place and
    /// returns the existing handle.
    pub fn insert(&mut self, key: K, value: V) -> Handle {
        if let Some(handle) = self.find(&key) {
            if let Some(row) = self.rows().row_of(handle) {
                self.values[row] = value;
                return handle;
            }
        }

        let handle = self.make_handle(self.keys.len());
        self.index.insert(key.clone(), handle);
        self.keys.push(key);
        self.values.push(value);
        handle
    }

    /// Looks up the handle owning `key`.
    #[inline]
    #[must_use]
    pub fn find(&self, key: &K) -> Option<Handle> {
        self.index.get(key).copied()
    }

    /// Gets the value behind a handle, or `None` if the handle is stale.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&V> {
        let row = self.rows().row_of(handle)?;
        self.values.get(row)
    }

    /// Gets the mutable value behind a handle, or `None` if the handle is stale.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut V> {
        let row = self.rows().row_of(handle)?;
        self.values.get_mut(row)
    }

    /// Removes the row owned by `handle` and returns it.
    ///
    /// The last row is swapped into the hole, so offsets of that row change.
    /// Every other handle keeps resolving to its own row.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if the handle is null, stale, or was never issued.
    pub fn remove(&mut self, handle: Handle) -> RadianceResult<(K, V)> {
        let row = self
            .rows()
            .row_of(handle)
            .ok_or_else(|| RadianceError::missing(format!("row for {handle:?}")))?;

        let last = self.keys.len() - 1;
        if row != last {
            if let Some(moved) = self.index.get(&self.keys[last]).copied() {
                self.slots[moved.index() as usize].row = row;
            }
        }

        let key = self.keys.swap_remove(row);
        let value = self.values.swap_remove(row);
        self.index.remove(&key);
        self.release_handle(handle);

        Ok((key, value))
    }

    /// Commits an element back into the row its identity resolves to.
    ///
    /// Handles and keys are resolved now, not at read time.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if the identity does not resolve to a live row.
    pub fn commit(&mut self, element: Element<K, V>) -> RadianceResult<()> {
        let row = self.rows().resolve(&element.id).ok_or_else(|| {
            RadianceError::missing(format!("{:?} target of write", element.indexed_by()))
        })?;
        self.values[row] = element.value;
        Ok(())
    }

    /// Key at a physical row.
    #[inline]
    #[must_use]
    pub fn key(&self, row: usize) -> Option<&K> {
        self.keys.get(row)
    }

    /// Value at a physical row.
    #[inline]
    #[must_use]
    pub fn value(&self, row: usize) -> Option<&V> {
        self.values.get(row)
    }

    /// Mutable value at a physical row.
    #[inline]
    pub fn value_mut(&mut self, row: usize) -> Option<&mut V> {
        self.values.get_mut(row)
    }

    /// The key column.
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The value column.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// The mutable value column. Row order and identity cannot change through it.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Iterates over `(key, value)` rows in physical order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Read-only identity lookups.
    #[inline]
    #[must_use]
    pub fn rows(&self) -> RowIndex<'_, K> {
        RowIndex {
            keys: &self.keys,
            slots: &self.slots,
            index: &self.index,
        }
    }

    /// Identity lookups alongside the mutable value column.
    ///
    /// Used by in-place passes: each worker resolves identities through the
    /// index while writing only the value slot of its own row.
    #[inline]
    pub fn rows_and_values_mut(&mut self) -> (RowIndex<'_, K>, &mut [V]) {
        let rows = RowIndex {
            keys: &self.keys,
            slots: &self.slots,
            index: &self.index,
        };
        (rows, &mut self.values)
    }

    /// Read-only façade over this table.
    #[inline]
    #[must_use]
    pub fn view(&self) -> View<'_, K, V> {
        View::new(self)
    }

    fn make_handle(&mut self, row: usize) -> Handle {
        if let Some(index) = self.free_handles.pop() {
            let slot = &mut self.slots[index as usize];
            slot.row = row;
            return Handle::new(index, slot.generation);
        }

        // u32::MAX is reserved for Handle::NULL.
        assert!(
            self.slots.len() < u32::MAX as usize,
            "Handle space exhausted"
        );
        let index = self.slots.len() as u32;
        self.slots.push(Slot { row, generation: 0 });
        Handle::new(index, 0)
    }

    fn release_handle(&mut self, handle: Handle) {
        let slot = &mut self.slots[handle.index() as usize];
        slot.row = VACANT;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_handles.push(handle.index());
    }

    /// Asserts every structural invariant.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.keys.len(), self.values.len());
        assert_eq!(self.index.len(), self.keys.len());
        assert_eq!(self.slots.len(), self.keys.len() + self.free_handles.len());
        for (row, key) in self.keys.iter().enumerate() {
            let handle = self.index[key];
            let slot = self.slots[handle.index() as usize];
            assert_eq!(slot.row, row);
            assert_eq!(slot.generation, handle.generation());
        }
        for &free in &self.free_handles {
            assert_eq!(self.slots[free as usize].row, VACANT);
        }
    }
}

/// Read-only identity lookups over a table's key column, slots, and index.
///
/// Cheap to copy and `Sync` for `Sync` keys, so parallel workers share one.
pub struct RowIndex<'a, K> {
    keys: &'a [K],
    slots: &'a [Slot],
    index: &'a HashMap<K, Handle>,
}

impl<K> Clone for RowIndex<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for RowIndex<'_, K> {}

impl<'a, K: Eq + Hash> RowIndex<'a, K> {
    /// Number of live rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Checks if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at a physical row.
    #[inline]
    #[must_use]
    pub fn key(&self, row: usize) -> Option<&'a K> {
        self.keys.get(row)
    }

    /// Handle owning `key`.
    #[inline]
    #[must_use]
    pub fn find(&self, key: &K) -> Option<Handle> {
        self.index.get(key).copied()
    }

    /// Current row of a live handle.
    #[inline]
    #[must_use]
    pub fn row_of(&self, handle: Handle) -> Option<usize> {
        let slot = self.slots.get(handle.index() as usize)?;
        (slot.generation == handle.generation() && slot.row < self.keys.len()).then_some(slot.row)
    }

    /// Handle owning the row at `row`.
    #[inline]
    #[must_use]
    pub fn handle_at(&self, row: usize) -> Option<Handle> {
        self.find(self.keys.get(row)?)
    }

    /// Resolves any identity to its current physical row.
    #[must_use]
    pub fn resolve(&self, id: &RowId<K>) -> Option<usize> {
        match id {
            RowId::Offset(row) => (*row < self.keys.len()).then_some(*row),
            RowId::Handle(handle) => self.row_of(*handle),
            RowId::Key(key) => self.row_of(self.find(key)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_insert_find_get() {
        let mut table: Table<u32, f32> = Table::new();
        for key in 0..100u32 {
            table.insert(key, key as f32 * 0.5);
        }
        for key in 0..100u32 {
            let handle = table.find(&key).unwrap();
            assert_eq!(*table.get(handle).unwrap(), key as f32 * 0.5);
        }
        assert_eq!(table.find(&1000), None);
        table.check_invariants();
    }

    #[test]
    fn test_remove_keeps_other_rows() {
        let mut table = Table::from_rows([(0u32, 'a'), (1, 'b'), (2, 'c')]);
        let h1 = table.find(&1).unwrap();
        let h2 = table.find(&2).unwrap();

        let removed = table.remove(table.find(&0).unwrap()).unwrap();
        assert_eq!(removed, (0, 'a'));
        assert_eq!(table.len(), 2);

        assert_eq!(table.find(&1), Some(h1));
        assert_eq!(table.find(&2), Some(h2));
        assert_eq!(table.get(h1), Some(&'b'));
        assert_eq!(table.get(h2), Some(&'c'));
        // The last row was swapped into the hole.
        assert_eq!(table.key(0), Some(&2));
        table.check_invariants();
    }

    #[test]
    fn test_remove_last_row() {
        let mut table = Table::from_rows([(0u32, 10u64), (1, 11)]);
        table.remove(table.find(&1).unwrap()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0), Some(&10));
        table.check_invariants();

        table.remove(table.find(&0).unwrap()).unwrap();
        assert!(table.is_empty());
        table.check_invariants();
    }

    #[test]
    fn test_handle_reuse_is_lifo() {
        let mut table = Table::from_rows([(0u32, 0u8), (1, 1), (2, 2)]);
        let h1 = table.find(&0).unwrap();
        let h2 = table.find(&1).unwrap();
        table.remove(h1).unwrap();
        table.remove(h2).unwrap();

        let first = table.insert(10, 10);
        let second = table.insert(11, 11);
        assert_eq!(first.index(), h2.index());
        assert_eq!(second.index(), h1.index());
        table.check_invariants();
    }

    #[test]
    fn test_stale_handle_is_detected() {
        let mut table = Table::from_rows([(0u32, 1u32)]);
        let old = table.find(&0).unwrap();
        table.remove(old).unwrap();

        let new = table.insert(5, 50);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(table.get(old), None);
        assert!(matches!(table.remove(old), Err(RadianceError::DoesNotExist(_))));
        assert_eq!(table.get(new), Some(&50));
        assert!(table.remove(Handle::NULL).is_err());
    }

    #[test]
    fn test_insert_existing_key_replaces() {
        let mut table: Table<&str, i32> = Table::new();
        let first = table.insert("a", 1);
        let second = table.insert("a", 2);
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(first), Some(&2));
        table.check_invariants();
    }

    #[test]
    fn test_commit_by_each_identity() {
        let mut table = Table::from_rows([(0u32, 0i32), (1, 0), (2, 0)]);
        let handle = table.find(&1).unwrap();

        table.commit(Element::new(RowId::Offset(0), 10)).unwrap();
        table.commit(Element::new(RowId::Handle(handle), 11)).unwrap();
        table.commit(Element::new(RowId::Key(2), 12)).unwrap();
        assert_eq!(table.values(), &[10, 11, 12]);

        assert!(table.commit(Element::new(RowId::Offset(3), 0)).is_err());
        assert!(table.commit(Element::new(RowId::Key(9), 0)).is_err());
    }

    #[test]
    fn test_commit_by_handle_after_relocation() {
        let mut table = Table::from_rows([(0u32, 0i32), (1, 0), (2, 0)]);
        let h2 = table.find(&2).unwrap();
        table.remove(table.find(&0).unwrap()).unwrap();

        table.commit(Element::new(RowId::Handle(h2), 42)).unwrap();
        assert_eq!(table.get(h2), Some(&42));
        assert_eq!(table.value(0), Some(&42));
    }

    #[test]
    fn test_random_churn_keeps_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let mut table: Table<u64, u64> = Table::new();
        let mut live: Vec<(u64, Handle)> = Vec::new();
        let mut next_key = 0u64;

        for _ in 0..5_000 {
            if live.is_empty() || rng.gen_bool(0.55) {
                let handle = table.insert(next_key, next_key * 3);
                live.push((next_key, handle));
                next_key += 1;
            } else {
                let pick = rng.gen_range(0..live.len());
                let (key, handle) = live.swap_remove(pick);
                assert_eq!(table.remove(handle).unwrap(), (key, key * 3));
            }
        }

        table.check_invariants();
        assert_eq!(table.len(), live.len());
        for (key, handle) in live {
            assert_eq!(table.find(&key), Some(handle));
            assert_eq!(table.get(handle), Some(&(key * 3)));
        }
    }
}
