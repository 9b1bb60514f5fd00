//! # Reader
//!
//! Data-parallel iteration over a table's rows.
//!
//! Every rayon split builds its own [`Frame`] in the fold's init closure and
//! reuses it for every row in that split. Frames are never shared between
//! concurrently processed rows.

use rayon::prelude::*;

use super::report::PassReport;
use crate::error::{RadianceError, RadianceResult};
use crate::exec::{Frame, SystemExecutor};
use crate::storage::{Element, IndexedBy, RowId, RowIndex, RowKey, RowValue, Table, View};

/// Frame type every typed pipeline system runs on.
pub type RowFrame<K, V> = Frame<Element<K, V>>;

/// Drives one pass over a table, addressing rows by one identity scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reader {
    indexed_by: IndexedBy,
    frame_capacity: usize,
}

impl Reader {
    /// Frame slots per worker unless configured otherwise.
    pub const DEFAULT_FRAME_CAPACITY: usize = 8;

    /// Creates a reader producing elements tagged with `indexed_by`.
    #[must_use]
    pub const fn new(indexed_by: IndexedBy) -> Self {
        Self {
            indexed_by,
            frame_capacity: Self::DEFAULT_FRAME_CAPACITY,
        }
    }

    /// Sets the per-worker frame capacity.
    #[must_use]
    pub const fn with_frame_capacity(mut self, frame_capacity: usize) -> Self {
        self.frame_capacity = frame_capacity;
        self
    }

    /// The identity scheme of produced elements.
    #[inline]
    #[must_use]
    pub const fn indexed_by(&self) -> IndexedBy {
        self.indexed_by
    }

    /// Slots in each worker's frame.
    #[inline]
    #[must_use]
    pub const fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Builds the element for one row.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if `row` is not a live row.
    pub fn element<K, V>(&self, rows: RowIndex<'_, K>, row: usize, value: &V) -> RadianceResult<Element<K, V>>
    where
        K: RowKey,
        V: Clone,
    {
        let id = match self.indexed_by {
            IndexedBy::Offset => RowId::Offset(row),
            IndexedBy::Handle => RowId::Handle(
                rows.handle_at(row)
                    .ok_or_else(|| RadianceError::missing(format!("handle of row {row}")))?,
            ),
            IndexedBy::Key => RowId::Key(
                rows.key(row)
                    .cloned()
                    .ok_or_else(|| RadianceError::missing(format!("key of row {row}")))?,
            ),
        };
        Ok(Element::new(id, value.clone()))
    }

    /// Runs the chain over every row without committing anything.
    ///
    /// Results left in the frame are discarded; a deferred writer's terminal
    /// system has already moved them into its buffer.
    pub fn observe<K, V>(&self, view: View<'_, K, V>, chain: &SystemExecutor<RowFrame<K, V>>) -> PassReport
    where
        K: RowKey,
        V: RowValue,
    {
        let rows = view.rows();
        let values = view.values();

        let mut report = (0..values.len())
            .into_par_iter()
            .fold(
                || (Frame::new(self.frame_capacity), PassReport::default()),
                |(mut frame, mut report), row| {
                    report.rows += 1;
                    if let Err(error) = self.process(rows, row, &values[row], chain, &mut frame) {
                        report.record_failure(row, error);
                    }
                    (frame, report)
                },
            )
            .map(|(_, report)| report)
            .reduce(PassReport::default, PassReport::merge);

        report.sort_failures();
        report
    }

    /// Runs the chain over every row and returns the results still in the
    /// frame, each paired with the row it was read from.
    pub fn collect<K, V>(
        &self,
        view: View<'_, K, V>,
        chain: &SystemExecutor<RowFrame<K, V>>,
    ) -> (PassReport, Vec<(usize, Element<K, V>)>)
    where
        K: RowKey,
        V: RowValue,
    {
        let rows = view.rows();
        let values = view.values();

        let (mut report, mut staged) = (0..values.len())
            .into_par_iter()
            .fold(
                || (Frame::new(self.frame_capacity), PassReport::default(), Vec::new()),
                |(mut frame, mut report, mut staged), row| {
                    report.rows += 1;
                    match self.process(rows, row, &values[row], chain, &mut frame) {
                        Ok(Some(element)) => staged.push((row, element)),
                        Ok(None) => {}
                        Err(error) => report.record_failure(row, error),
                    }
                    (frame, report, staged)
                },
            )
            .map(|(_, report, staged)| (report, staged))
            .reduce(
                || (PassReport::default(), Vec::new()),
                |(left, mut left_staged), (right, right_staged)| {
                    left_staged.extend(right_staged);
                    (left.merge(right), left_staged)
                },
            );

        report.sort_failures();
        staged.sort_unstable_by_key(|(row, _)| *row);
        (report, staged)
    }

    /// Runs the chain over every row and writes results back into `table`.
    ///
    /// A result whose identity resolves to the row it was read from is written
    /// by that row's worker. A result aimed at another live row is held until
    /// the parallel join and then committed sequentially, so no two workers
    /// ever write the same slot. A result whose identity no longer resolves is
    /// reported as `DoesNotExist`.
    pub fn update_in_place<K, V>(&self, table: &mut Table<K, V>, chain: &SystemExecutor<RowFrame<K, V>>) -> PassReport
    where
        K: RowKey,
        V: RowValue,
    {
        let (rows, values) = table.rows_and_values_mut();

        let (mut report, mut redirected) = values
            .par_iter_mut()
            .enumerate()
            .fold(
                || (Frame::new(self.frame_capacity), PassReport::default(), Vec::new()),
                |(mut frame, mut report, mut redirected), (row, value)| {
                    report.rows += 1;
                    match self.process(rows, row, value, chain, &mut frame) {
                        Ok(Some(element)) => match rows.resolve(&element.id) {
                            Some(target) if target == row => {
                                *value = element.value;
                                report.committed += 1;
                            }
                            Some(_) => redirected.push((row, element)),
                            None => report.record_failure(
                                row,
                                RadianceError::missing(format!(
                                    "{:?} target of row {row}",
                                    element.indexed_by()
                                )),
                            ),
                        },
                        Ok(None) => {}
                        Err(error) => report.record_failure(row, error),
                    }
                    (frame, report, redirected)
                },
            )
            .map(|(_, report, redirected)| (report, redirected))
            .reduce(
                || (PassReport::default(), Vec::new()),
                |(left, mut left_redirected), (right, right_redirected)| {
                    left_redirected.extend(right_redirected);
                    (left.merge(right), left_redirected)
                },
            );

        redirected.sort_unstable_by_key(|(row, _)| *row);
        for (row, element) in redirected {
            match table.commit(element) {
                Ok(()) => report.committed += 1,
                Err(error) => report.record_failure(row, error),
            }
        }

        report.sort_failures();
        report
    }

    fn process<K, V>(
        &self,
        rows: RowIndex<'_, K>,
        row: usize,
        value: &V,
        chain: &SystemExecutor<RowFrame<K, V>>,
        frame: &mut RowFrame<K, V>,
    ) -> RadianceResult<Option<Element<K, V>>>
    where
        K: RowKey,
        V: RowValue,
    {
        frame.clear();
        frame.push(self.element(rows, row, value)?)?;
        chain.run(frame)?;
        Ok(frame.take_result().ok())
    }
}
