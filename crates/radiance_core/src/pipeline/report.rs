//! # Pass Reports
//!
//! Per-pass outcome reporting.

use crate::error::RadianceError;

/// One row whose chain or commit failed during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFailure {
    /// Physical row at read time.
    pub row: usize,
    /// What went wrong.
    pub error: RadianceError,
}

/// Outcome of one pipeline pass.
///
/// A failing row never aborts its siblings; it is recorded here instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Rows the reader visited.
    pub rows: usize,
    /// Results written into the sink during the pass.
    pub committed: usize,
    /// Failed rows, in ascending row order.
    pub failures: Vec<RowFailure>,
}

impl PassReport {
    /// Checks if no row failed.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed rows.
    #[inline]
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub(crate) fn record_failure(&mut self, row: usize, error: RadianceError) {
        self.failures.push(RowFailure { row, error });
    }

    /// Combines the reports of two disjoint sets of rows.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.rows += other.rows;
        self.committed += other.committed;
        self.failures.extend(other.failures);
        self
    }

    pub(crate) fn sort_failures(&mut self) {
        self.failures.sort_by_key(|failure| failure.row);
    }
}
