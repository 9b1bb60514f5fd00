//! # Table Collection
//!
//! A collection backed by a native [`Table`].

use std::hash::Hash;

use bytemuck::Pod;
use radiance_core::{
    resolve_default, Element, RadianceError, RadianceResult, RowId, ScratchStack, Table,
};

use super::record::{self, Component};
use super::Collection;

/// Adapts a [`Table`] of plain-old-data keys and component values to the
/// collection boundary.
///
/// `copy` emits a key-addressed `Write` record, so results written back land
/// on the same key even if another pipeline moved the row in between.
pub struct TableCollection<K, V> {
    table: Table<K, V>,
}

impl<K, V> TableCollection<K, V>
where
    K: Pod + Eq + Hash,
    V: Component,
{
    /// Wraps a table.
    #[must_use]
    pub fn new(table: Table<K, V>) -> Self {
        Self { table }
    }

    /// The backing table.
    #[must_use]
    pub fn table(&self) -> &Table<K, V> {
        &self.table
    }

    /// The backing table, mutably.
    pub fn table_mut(&mut self) -> &mut Table<K, V> {
        &mut self.table
    }

    /// Unwraps the backing table.
    #[must_use]
    pub fn into_table(self) -> Table<K, V> {
        self.table
    }
}

impl<K, V> Collection for TableCollection<K, V>
where
    K: Pod + Eq + Hash + Send + Sync,
    V: Component,
{
    fn count(&self) -> u64 {
        self.table.len() as u64
    }

    fn copy(&self, row: u64, scratch: &mut ScratchStack) -> RadianceResult<()> {
        let missing = || RadianceError::DoesNotExist(format!("row {row}"));
        let row = usize::try_from(row).map_err(|_| missing())?;
        let key = *self.table.key(row).ok_or_else(missing)?;
        let value = *self.table.value(row).ok_or_else(missing)?;
        record::encode(scratch, &radiance_core::Mutation::Write(Element::new(RowId::Key(key), value)))
    }

    fn mutate(&mut self, record: &[u8]) -> RadianceResult<()> {
        let mutation = record::decode::<K, V>(record)?;
        resolve_default(&mut self.table, mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use radiance_core::Mutation;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Mass(f64);

    impl Component for Mass {
        const FAMILY: u32 = 21;
    }

    #[test]
    fn test_copy_then_mutate_round_trips_through_key() {
        let mut collection = TableCollection::new(Table::from_rows([(1u64, Mass(1.0)), (2, Mass(2.0))]));
        let mut scratch = ScratchStack::new(256);
        collection.copy(1, &mut scratch).unwrap();
        record::update_top::<u64, Mass>(&mut scratch, |mass| mass.0 += 0.5).unwrap();

        // Reorder the table so the record's row offset is stale.
        let first = collection.table().find(&1).unwrap();
        collection.table_mut().remove(first).unwrap();

        collection.mutate(scratch.top().unwrap()).unwrap();
        let table = collection.table();
        assert_eq!(table.get(table.find(&2).unwrap()), Some(&Mass(2.5)));
    }

    #[test]
    fn test_structural_records() {
        let mut collection: TableCollection<u64, Mass> = TableCollection::new(Table::new());
        let mut scratch = ScratchStack::new(256);

        record::encode(&mut scratch, &Mutation::Insert { key: 5u64, value: Mass(5.0) }).unwrap();
        collection.mutate(scratch.top().unwrap()).unwrap();
        assert_eq!(collection.count(), 1);

        scratch.clear();
        record::encode::<u64, Mass>(&mut scratch, &Mutation::Remove { key: 5 }).unwrap();
        collection.mutate(scratch.top().unwrap()).unwrap();
        assert_eq!(collection.count(), 0);
        assert!(collection.mutate(scratch.top().unwrap()).is_err());
    }

    #[test]
    fn test_copy_out_of_range() {
        let collection: TableCollection<u64, Mass> = TableCollection::new(Table::new());
        let mut scratch = ScratchStack::new(64);
        assert!(matches!(collection.copy(0, &mut scratch), Err(RadianceError::DoesNotExist(_))));
    }
}
