//! # Execution Module
//!
//! The per-row unit of work:
//! - `Frame`: typed bounded scratch carrying one current result
//! - `ScratchStack`: byte-level bounded scratch for serialized rows
//! - `System`/`SystemExecutor`: ordered chains of per-row transforms

mod frame;
mod scratch;
mod system;

pub use frame::Frame;
pub use scratch::ScratchStack;
pub use system::{System, SystemExecutor, SystemId};
