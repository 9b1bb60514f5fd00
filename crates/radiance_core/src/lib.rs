//! # Radiance Core
//!
//! Data-oriented storage and execution for large populations of
//! independent records:
//! - Columnar tables with O(1) swap-remove and stable generational handles
//! - Per-row transformation chains over bounded scratch frames
//! - Data-parallel passes that commit results back safely
//! - Lock-free deferred mutation, flushed between passes
//!
//! ## Architecture Rules
//!
//! 1. **Tables own their columns** - `keys[i]` and `values[i]` always belong to
//!    the same record
//! 2. **No structural mutation during a pass** - insert/remove relocate rows,
//!    so they go through a [`MutationBuffer`] flushed between passes
//! 3. **Per-worker scratch** - every worker builds its own [`Frame`], frames are
//!    never shared between concurrent rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use radiance_core::{IndexedBy, Pipeline, Reader, System, Table, Writer};
//!
//! let table = Table::from_rows([(0u32, 1.0f32), (1, 2.0)]).into_shared();
//! let mut pass = Pipeline::new(table.clone(), table.clone(),
//!     Reader::new(IndexedBy::Offset), Writer::Direct);
//! pass.add(System::new(|frame| {
//!     frame.result_mut()?.value += 1.0;
//!     Ok(())
//! }));
//! let report = pass.run();
//! assert!(report.is_clean());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod exec;
pub mod pipeline;
pub mod storage;

pub use error::{RadianceError, RadianceResult};
pub use exec::{Frame, ScratchStack, System, SystemExecutor, SystemId};
pub use pipeline::{
    resolve_default, FlushStats, MutateBy, Mutation, MutationBuffer, PassReport, Pipeline,
    Reader, RowFailure, RowFrame, Writer,
};
pub use storage::{
    Element, Handle, IndexedBy, RowId, RowIndex, RowKey, RowValue, SharedTable, Table, View,
};
