//! # Radiance Runtime
//!
//! Programs, collections, and scheduling on top of [`radiance_core`].
//!
//! ## Design Principles
//!
//! 1. **Paths name everything** - collections live at `"<program>/<name>"`,
//!    and one store can be reachable under several paths
//! 2. **Byte-record boundary** - pipelines move rows between collections as
//!    self-describing records, so foreign stores plug in through one trait
//! 3. **Deterministic ticks** - loop pipelines run in ascending priority,
//!    each pass completing before the next one begins
//!
//! ## Example
//!
//! ```rust,ignore
//! use radiance::{record, ExecutionPolicy, RuntimeConfig, Table, Trigger, Universe};
//!
//! let mut universe = Universe::new(RuntimeConfig::default())?;
//! let main = universe.create_program("main")?;
//! universe.add_table(main, "particles", Table::from_rows([(0u32, Speed(1.0))]))?;
//!
//! let step = universe.add_pipeline(main, "particles", "particles")?;
//! universe.add_system(step, record::system::<u32, Speed, _>(|speed| speed.0 *= 0.5))?;
//! universe.enable_pipeline(step, ExecutionPolicy::new(0, Trigger::Loop))?;
//!
//! universe.init()?;
//! universe.start()?;
//! universe.tick()?;
//! universe.stop()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collection;
pub mod config;
pub mod program;
pub mod registry;
pub mod universe;

pub use collection::{record, Collection, CollectionRef, Component, RecordHeader, TableCollection};
pub use config::RuntimeConfig;
pub use program::{CollectionPipeline, ExecutionPolicy, PipelineId, Program, Trigger};
pub use registry::{CollectionId, CollectionRegistry, ProgramId, ProgramRegistry};
pub use universe::{PipelineRef, RunState, TickReport, Universe};

pub use radiance_core::{
    Element, FlushStats, Handle, IndexedBy, MutateBy, Mutation, MutationBuffer, PassReport,
    Pipeline, RadianceError, RadianceResult, Reader, RowFailure, RowId, ScratchStack, System,
    SystemId, Table, Writer,
};
