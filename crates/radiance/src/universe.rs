//! # Universe
//!
//! Top-level runtime: registries, the run-state machine, and the worker pool.
//!
//! ## Run States
//!
//! ```text
//! init:  STOPPED | ERROR     -> INITIALIZED
//! start: INITIALIZED         -> STARTED
//! tick:  STARTED | RUNNING   -> RUNNING
//! stop:  RUNNING | UNKNOWN   -> STOPPED
//! ```
//!
//! Any other transition latches `ERROR` and fails with `BadRunState`. Only
//! `init` leaves `ERROR`.
//!
//! ## Ticks
//!
//! A tick runs every program's loop pipelines, then flushes each
//! [`MutationBuffer`] registered with [`Universe::flush_after_tick`], so
//! structural changes requested during the tick are visible to the next one.

use std::hash::Hash;
use std::sync::Arc;

use bytemuck::Pod;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use radiance_core::{
    FlushStats, MutationBuffer, PassReport, RadianceError, RadianceResult, ScratchStack, System,
    SystemId, Table,
};

use crate::collection::{Collection, CollectionRef, Component, TableCollection};
use crate::config::RuntimeConfig;
use crate::program::{CollectionPipeline, ExecutionPolicy, PipelineId};
use crate::registry::{self, CollectionId, CollectionRegistry, ProgramId, ProgramRegistry};

/// Lifecycle state of a [`Universe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    /// An illegal transition was attempted.
    Error,
    /// Not known.
    Unknown,
    /// Ready to start.
    Initialized,
    /// Started, no tick yet.
    Started,
    /// Ticking.
    Running,
    /// Not running.
    Stopped,
}

/// A pipeline together with the program that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineRef {
    /// Owning program.
    pub program: ProgramId,
    /// Pipeline within that program.
    pub pipeline: PipelineId,
}

/// Outcome of one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Every loop pass, in execution order.
    pub passes: Vec<(PipelineRef, PassReport)>,
    /// Buffered mutations flushed after the passes.
    pub flushed: FlushStats,
}

impl TickReport {
    /// The report of one pipeline's pass, if it ran this tick.
    #[must_use]
    pub fn pass(&self, pipeline: PipelineRef) -> Option<&PassReport> {
        self.passes
            .iter()
            .find(|(candidate, _)| *candidate == pipeline)
            .map(|(_, report)| report)
    }

    /// All passes merged. Failed rows lose their pipeline.
    #[must_use]
    pub fn total(&self) -> PassReport {
        self.passes
            .iter()
            .map(|(_, report)| report.clone())
            .fold(PassReport::default(), PassReport::merge)
    }

    /// Checks if no row failed in any pass.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.passes.iter().all(|(_, report)| report.is_clean())
    }
}

type Flush = Box<dyn Fn() -> FlushStats + Send + Sync>;

/// The runtime.
pub struct Universe {
    config: RuntimeConfig,
    state: RunState,
    collections: CollectionRegistry,
    programs: ProgramRegistry,
    flushes: Vec<Flush>,
    pool: Option<rayon::ThreadPool>,
    event_tx: Sender<PipelineRef>,
    event_rx: Receiver<PipelineRef>,
}

impl Universe {
    /// Creates a stopped universe.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the config does not validate or the worker pool
    /// cannot be built.
    pub fn new(config: RuntimeConfig) -> RadianceResult<Self> {
        config.validate()?;
        let pool = match config.worker_threads {
            0 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("radiance-worker-{i}"))
                    .build()
                    .map_err(|e| RadianceError::InvalidConfig(e.to_string()))?,
            ),
        };
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        tracing::debug!(?config, "universe created");

        Ok(Self {
            config,
            state: RunState::Stopped,
            collections: CollectionRegistry::new(),
            programs: ProgramRegistry::new(),
            flushes: Vec::new(),
            pool,
            event_tx,
            event_rx,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current run state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, allowed: &[RunState], next: RunState) -> RadianceResult<()> {
        if !allowed.contains(&self.state) {
            tracing::warn!(from = ?self.state, to = ?next, "illegal run-state transition");
            self.state = RunState::Error;
            return Err(RadianceError::BadRunState);
        }
        tracing::debug!(from = ?self.state, to = ?next, "run-state transition");
        self.state = next;
        Ok(())
    }

    /// `STOPPED | ERROR -> INITIALIZED`.
    ///
    /// # Errors
    ///
    /// `BadRunState` from any other state.
    pub fn init(&mut self) -> RadianceResult<()> {
        self.transition(&[RunState::Stopped, RunState::Error], RunState::Initialized)
    }

    /// `INITIALIZED -> STARTED`.
    ///
    /// # Errors
    ///
    /// `BadRunState` from any other state.
    pub fn start(&mut self) -> RadianceResult<()> {
        self.transition(&[RunState::Initialized], RunState::Started)
    }

    /// `STARTED | RUNNING -> RUNNING`, then runs every program's loop
    /// pipelines once, programs in creation order, and flushes the
    /// registered mutation buffers.
    ///
    /// # Errors
    ///
    /// `BadRunState` from any other state.
    pub fn tick(&mut self) -> RadianceResult<TickReport> {
        self.transition(&[RunState::Started, RunState::Running], RunState::Running)?;
        let scratch = self.config.scratch_capacity;
        let programs = &self.programs;
        let passes = self.install(|| {
            programs
                .iter()
                .flat_map(|program| {
                    let owner = program.id();
                    program.run_loop(scratch).into_iter().map(move |(pipeline, report)| {
                        (PipelineRef { program: owner, pipeline }, report)
                    })
                })
                .collect::<Vec<_>>()
        });
        let flushed = self
            .flushes
            .iter()
            .map(|flush| flush())
            .fold(FlushStats::default(), FlushStats::merge);

        let report = TickReport { passes, flushed };
        let total = report.total();
        tracing::trace!(
            pipelines = report.passes.len(),
            rows = total.rows,
            committed = total.committed,
            flushed = flushed.applied,
            "tick complete"
        );
        Ok(report)
    }

    /// Flushes `buffer` into `target` at the end of every tick.
    pub fn flush_after_tick<K, V>(
        &mut self,
        buffer: Arc<MutationBuffer<K, V>>,
        target: Arc<RwLock<TableCollection<K, V>>>,
    ) where
        K: Pod + Eq + Hash + Send + Sync,
        V: Component,
    {
        self.flushes
            .push(Box::new(move || buffer.flush(target.write().table_mut())));
    }

    /// `RUNNING | UNKNOWN -> STOPPED`.
    ///
    /// # Errors
    ///
    /// `BadRunState` from any other state.
    pub fn stop(&mut self) -> RadianceResult<()> {
        self.transition(&[RunState::Running, RunState::Unknown], RunState::Stopped)
    }

    fn install<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Creates a program.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken.
    pub fn create_program(&mut self, name: &str) -> RadianceResult<ProgramId> {
        self.programs.create(name)
    }

    /// Looks a program up by name.
    #[must_use]
    pub fn program_id(&self, name: &str) -> Option<ProgramId> {
        self.programs.id(name)
    }

    fn path_in(&self, program: ProgramId, name: &str) -> RadianceResult<String> {
        if name.contains('/') {
            return Ok(name.to_owned());
        }
        Ok(registry::path(self.programs.get(program)?.name(), name))
    }

    /// Registers `collection` as `name` inside `program`. The caller keeps
    /// typed access through its own handle.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown program, `AlreadyExists` if the path is
    /// taken.
    pub fn add_collection<C: Collection + 'static>(
        &mut self,
        program: ProgramId,
        name: &str,
        collection: Arc<RwLock<C>>,
    ) -> RadianceResult<CollectionId> {
        let path = self.path_in(program, name)?;
        let store: CollectionRef = collection;
        self.collections.add(&path, store)
    }

    /// Registers a native table as `name` inside `program`.
    ///
    /// # Errors
    ///
    /// As for [`Universe::add_collection`].
    pub fn add_table<K, V>(
        &mut self,
        program: ProgramId,
        name: &str,
        table: Table<K, V>,
    ) -> RadianceResult<Arc<RwLock<TableCollection<K, V>>>>
    where
        K: Pod + Eq + Hash + Send + Sync,
        V: Component,
    {
        let collection = Arc::new(RwLock::new(TableCollection::new(table)));
        self.add_collection(program, name, Arc::clone(&collection))?;
        Ok(collection)
    }

    /// Resolves a `"<program>/<name>"` path.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if nothing is registered there.
    pub fn collection(&self, path: &str) -> RadianceResult<CollectionRef> {
        self.collections.resolve(path).map(|(_, store)| store)
    }

    /// Makes `dst_path` resolve to the store behind `src_path`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `dst_path` resolves, `DoesNotExist` if `src_path`
    /// does not.
    pub fn share_collection(&mut self, src_path: &str, dst_path: &str) -> RadianceResult<()> {
        self.collections.share(src_path, dst_path).map(|_| ())
    }

    /// Creates a pipeline in `program` reading `source` and writing `sink`.
    ///
    /// Names without a `/` are resolved inside the program. The pipeline has
    /// no systems and is not enabled.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown program or collection.
    pub fn add_pipeline(&mut self, program: ProgramId, source: &str, sink: &str) -> RadianceResult<PipelineRef> {
        let (source_id, source_store) = self.collections.resolve(&self.path_in(program, source)?)?;
        let (sink_id, sink_store) = self.collections.resolve(&self.path_in(program, sink)?)?;

        let mut pipeline = CollectionPipeline::new();
        pipeline.add_source(source_id, source_store)?;
        pipeline.add_sink(sink_id, sink_store)?;

        let program_ref = self.programs.get_mut(program)?;
        let id = program_ref.add_pipeline(pipeline);
        tracing::debug!(program = program_ref.name(), pipeline = id.raw(), source, sink, "pipeline added");
        Ok(PipelineRef { program, pipeline: id })
    }

    /// Creates a pipeline in `program` with no bindings.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown program.
    pub fn add_empty_pipeline(&mut self, program: ProgramId) -> RadianceResult<PipelineRef> {
        let id = self.programs.get_mut(program)?.add_pipeline(CollectionPipeline::new());
        Ok(PipelineRef { program, pipeline: id })
    }

    fn pipeline_mut(&mut self, pipeline: PipelineRef) -> RadianceResult<&mut CollectionPipeline> {
        self.programs.get_mut(pipeline.program)?.pipeline_mut(pipeline.pipeline)
    }

    /// Adds another source collection.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if it is already a source, `DoesNotExist` for an
    /// unknown pipeline or collection.
    pub fn add_source(&mut self, pipeline: PipelineRef, name: &str) -> RadianceResult<()> {
        let (id, store) = self.collections.resolve(&self.path_in(pipeline.program, name)?)?;
        self.pipeline_mut(pipeline)?.add_source(id, store)
    }

    /// Adds another sink collection.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if it is already a sink, `DoesNotExist` for an unknown
    /// pipeline or collection.
    pub fn add_sink(&mut self, pipeline: PipelineRef, name: &str) -> RadianceResult<()> {
        let (id, store) = self.collections.resolve(&self.path_in(pipeline.program, name)?)?;
        self.pipeline_mut(pipeline)?.add_sink(id, store)
    }

    /// Appends a system to a pipeline's chain.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown pipeline.
    pub fn add_system(&mut self, pipeline: PipelineRef, system: System<ScratchStack>) -> RadianceResult<SystemId> {
        Ok(self.pipeline_mut(pipeline)?.add_system(system))
    }

    /// Filters a pipeline's source rows. The predicate sees one record per
    /// source, in binding order.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown pipeline.
    pub fn set_select<P>(&mut self, pipeline: PipelineRef, predicate: P) -> RadianceResult<()>
    where
        P: Fn(&[&[u8]]) -> bool + Send + Sync + 'static,
    {
        self.pipeline_mut(pipeline)?.set_select(predicate);
        Ok(())
    }

    /// Schedules a pipeline.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown pipeline.
    pub fn enable_pipeline(&mut self, pipeline: PipelineRef, policy: ExecutionPolicy) -> RadianceResult<()> {
        self.programs.get_mut(pipeline.program)?.enable(pipeline.pipeline, policy)
    }

    /// Unschedules a pipeline. Idempotent.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown pipeline.
    pub fn disable_pipeline(&mut self, pipeline: PipelineRef) -> RadianceResult<()> {
        self.programs.get_mut(pipeline.program)?.disable(pipeline.pipeline)
    }

    /// Unschedules and drops a pipeline.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an unknown pipeline.
    pub fn remove_pipeline(&mut self, pipeline: PipelineRef) -> RadianceResult<()> {
        self.programs.get_mut(pipeline.program)?.remove(pipeline.pipeline).map(|_| ())
    }

    /// Runs one event pipeline now.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` unless the pipeline is enabled with `Trigger::Event`.
    pub fn run_event(&self, pipeline: PipelineRef) -> RadianceResult<PassReport> {
        let program = self.programs.get(pipeline.program)?;
        let scratch = self.config.scratch_capacity;
        self.install(|| program.run_event(pipeline.pipeline, scratch))
    }

    /// A sender other threads can use to request event pipelines.
    #[must_use]
    pub fn event_sender(&self) -> Sender<PipelineRef> {
        self.event_tx.clone()
    }

    /// Runs every queued event request, in request order.
    pub fn dispatch_events(&self) -> Vec<(PipelineRef, RadianceResult<PassReport>)> {
        let requests: Vec<PipelineRef> = self.event_rx.try_iter().collect();
        if !requests.is_empty() {
            tracing::debug!(count = requests.len(), "dispatching event requests");
        }
        requests
            .into_iter()
            .map(|pipeline| {
                let result = self.run_event(pipeline);
                if let Err(error) = &result {
                    tracing::warn!(?pipeline, %error, "event request failed");
                }
                (pipeline, result)
            })
            .collect()
    }
}
