//! # Storage Module
//!
//! Columnar row storage:
//! - `Table`: parallel key/value columns with handle indirection
//! - `View`: read-only façade for lookups during a pass
//! - `Handle`/`RowId`/`Element`: the three row identity schemes

mod handle;
mod table;
mod view;

pub use handle::{Element, Handle, IndexedBy, RowId, RowKey, RowValue};
pub use table::{RowIndex, SharedTable, Table};
pub use view::View;
