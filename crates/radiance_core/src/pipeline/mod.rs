//! # Pipeline Module
//!
//! One runnable pass: Reader -> Systems -> Writer.
//!
//! ## Locking
//!
//! A pass locks its tables for its whole duration:
//! - In-place direct pass (source is sink): write lock
//! - Observation or deferred pass: read lock on the source
//! - Direct pass into another table: read lock on the source while the chain
//!   runs, released before the sink's write lock is taken
//!
//! Structural mutation therefore cannot race an in-flight pass.

mod mutation;
mod reader;
mod report;
mod writer;

use std::sync::Arc;

pub use mutation::{resolve_default, FlushStats, MutateBy, Mutation, MutationBuffer};
pub use reader::{Reader, RowFrame};
pub use report::{PassReport, RowFailure};
pub use writer::Writer;

use crate::exec::{Frame, System, SystemExecutor, SystemId};
use crate::storage::{RowKey, RowValue, SharedTable};

/// A bound Reader, chain of systems, and Writer.
///
/// # Example
///
/// ```rust,ignore
/// let table = Table::from_rows([(0u32, 1.0f32)]).into_shared();
/// let mut pass = Pipeline::new(table.clone(), table, Reader::new(IndexedBy::Handle), Writer::Direct);
/// pass.add(System::new(|frame| { frame.result_mut()?.value *= 2.0; Ok(()) }));
/// assert!(pass.run().is_clean());
/// ```
pub struct Pipeline<K, V> {
    source: Option<SharedTable<K, V>>,
    sink: Option<SharedTable<K, V>>,
    reader: Option<Reader>,
    writer: Option<Writer<K, V>>,
    systems: SystemExecutor<RowFrame<K, V>>,
    frame_capacity: usize,
}

impl<K: RowKey, V: RowValue> Pipeline<K, V> {
    /// Creates a pass reading `source` and committing into `sink`.
    ///
    /// `source` and `sink` may be the same table.
    #[must_use]
    pub fn new(source: SharedTable<K, V>, sink: SharedTable<K, V>, reader: Reader, writer: Writer<K, V>) -> Self {
        Self {
            source: Some(source),
            sink: Some(sink),
            reader: Some(reader),
            systems: SystemExecutor::with_back(writer.terminal()),
            writer: Some(writer),
            frame_capacity: reader.frame_capacity(),
        }
    }

    /// Creates an observation-only pass with no writer.
    #[must_use]
    pub fn observer(source: SharedTable<K, V>, reader: Reader) -> Self {
        Self {
            source: Some(source),
            sink: None,
            reader: Some(reader),
            writer: None,
            systems: SystemExecutor::new(),
            frame_capacity: reader.frame_capacity(),
        }
    }

    /// Creates a reader-less pass: the chain runs once on an empty frame and
    /// whatever result it leaves is committed into `sink`.
    #[must_use]
    pub fn generator(sink: SharedTable<K, V>, writer: Writer<K, V>) -> Self {
        Self {
            source: None,
            sink: Some(sink),
            reader: None,
            systems: SystemExecutor::with_back(writer.terminal()),
            writer: Some(writer),
            frame_capacity: Reader::DEFAULT_FRAME_CAPACITY,
        }
    }

    /// Sets the slots of every frame this pass builds, the reader's included.
    /// Reader-less passes otherwise use [`Reader::DEFAULT_FRAME_CAPACITY`].
    #[must_use]
    pub fn with_frame_capacity(mut self, frame_capacity: usize) -> Self {
        self.frame_capacity = frame_capacity;
        if let Some(reader) = self.reader {
            self.reader = Some(reader.with_frame_capacity(frame_capacity));
        }
        self
    }

    /// Slots in each frame this pass builds.
    #[inline]
    #[must_use]
    pub const fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Appends a system to the chain.
    pub fn add(&mut self, system: System<RowFrame<K, V>>) -> SystemId {
        self.systems.push(system)
    }

    /// Appends systems in order.
    pub fn add_all<I>(&mut self, systems: I) -> Vec<SystemId>
    where
        I: IntoIterator<Item = System<RowFrame<K, V>>>,
    {
        self.systems.push_all(systems)
    }

    /// Removes a system from the chain.
    pub fn erase(&mut self, id: SystemId) -> bool {
        self.systems.erase(id)
    }

    /// The chain, terminal system included.
    #[must_use]
    pub fn systems(&self) -> &SystemExecutor<RowFrame<K, V>> {
        &self.systems
    }

    /// Runs one full pass.
    ///
    /// An empty source is a no-op. Per-row failures are reported and never
    /// abort the rest of the pass.
    pub fn run(&self) -> PassReport {
        let report = match (&self.source, &self.sink, self.reader, &self.writer) {
            (Some(source), Some(sink), Some(reader), Some(Writer::Direct)) => {
                if Arc::ptr_eq(source, sink) {
                    let mut table = sink.write();
                    reader.update_in_place(&mut table, &self.systems)
                } else {
                    let (mut report, staged) = {
                        let table = source.read();
                        reader.collect(table.view(), &self.systems)
                    };
                    let mut table = sink.write();
                    for (row, element) in staged {
                        match table.commit(element) {
                            Ok(()) => report.committed += 1,
                            Err(error) => report.record_failure(row, error),
                        }
                    }
                    report.sort_failures();
                    report
                }
            }
            (Some(source), _, Some(reader), _) => {
                let table = source.read();
                reader.observe(table.view(), &self.systems)
            }
            (None, Some(sink), _, Some(writer)) => self.generate(sink, writer),
            _ => PassReport::default(),
        };

        tracing::trace!(
            rows = report.rows,
            committed = report.committed,
            failed = report.failed(),
            "pipeline pass complete"
        );
        if !report.is_clean() {
            tracing::warn!(failed = report.failed(), "pipeline pass reported failed rows");
        }
        report
    }

    fn generate(&self, sink: &SharedTable<K, V>, writer: &Writer<K, V>) -> PassReport {
        let mut report = PassReport {
            rows: 1,
            ..PassReport::default()
        };
        let mut frame = Frame::new(self.frame_capacity);
        if let Err(error) = self.systems.run(&mut frame) {
            report.record_failure(0, error);
            return report;
        }
        if let Ok(element) = frame.take_result() {
            match writer.commit(&mut sink.write(), element) {
                Ok(()) if writer.is_direct() => report.committed += 1,
                Ok(()) => {}
                Err(error) => report.record_failure(0, error),
            }
        }
        report
    }
}
