//! # Programs
//!
//! A program owns pipelines over collections and decides when they run:
//! - `Loop` pipelines run once per tick in ascending priority
//! - `Event` pipelines run only when explicitly requested
//!
//! A pipeline moves rows between collections as byte records. Sources are
//! read in lockstep: row `i` of every source is copied onto a worker's
//! [`ScratchStack`], one record per source in binding order. The tuple is
//! optionally filtered, transformed by the system chain, and the record left
//! on top is committed to every sink after the parallel join. A pass reads
//! as many rows as its shortest source holds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use radiance_core::{
    PassReport, RadianceError, RadianceResult, RowFailure, ScratchStack, System, SystemExecutor,
    SystemId,
};
use rayon::prelude::*;

use crate::collection::{Collection, CollectionRef};
use crate::registry::{CollectionId, ProgramId};

/// When a pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Trigger {
    /// Every tick.
    Loop = 1,
    /// On demand only.
    Event = 2,
}

impl TryFrom<u8> for Trigger {
    type Error = RadianceError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Loop),
            2 => Ok(Self::Event),
            other => Err(RadianceError::UnknownTriggerPolicy(other)),
        }
    }
}

/// Scheduling policy of an enabled pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionPolicy {
    /// Lower runs earlier within a tick.
    pub priority: i8,
    /// Loop or event.
    pub trigger: Trigger,
}

impl ExecutionPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(priority: i8, trigger: Trigger) -> Self {
        Self { priority, trigger }
    }
}

/// Identifies a pipeline together with the program that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineId {
    program: ProgramId,
    index: u32,
}

impl PipelineId {
    /// Raw id value, unique within the owning program.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.index
    }

    /// The program that owns this pipeline.
    #[inline]
    #[must_use]
    pub const fn program(self) -> ProgramId {
        self.program
    }
}

type Select = Arc<dyn Fn(&[&[u8]]) -> bool + Send + Sync>;

#[derive(Clone)]
struct Binding {
    id: CollectionId,
    store: CollectionRef,
}

/// A pass from source collections, through a system chain, into sinks.
///
/// With no sources the chain runs once on an empty stack and its top record,
/// if any, is committed. With no sinks the pass only observes.
#[derive(Clone, Default)]
pub struct CollectionPipeline {
    sources: Vec<Binding>,
    sinks: Vec<Binding>,
    systems: SystemExecutor<ScratchStack>,
    select: Option<Select>,
}

impl fmt::Debug for CollectionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionPipeline")
            .field("sources", &self.sources.iter().map(|b| b.id).collect::<Vec<_>>())
            .field("sinks", &self.sinks.iter().map(|b| b.id).collect::<Vec<_>>())
            .field("systems", &self.systems.len())
            .field("select", &self.select.is_some())
            .finish()
    }
}

impl CollectionPipeline {
    /// Creates a pipeline with no bindings and no systems.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads rows from `store`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `id` is already a source.
    pub fn add_source(&mut self, id: CollectionId, store: CollectionRef) -> RadianceResult<()> {
        Self::bind(&mut self.sources, id, store, "source")
    }

    /// Commits results into `store`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `id` is already a sink.
    pub fn add_sink(&mut self, id: CollectionId, store: CollectionRef) -> RadianceResult<()> {
        Self::bind(&mut self.sinks, id, store, "sink")
    }

    fn bind(bindings: &mut Vec<Binding>, id: CollectionId, store: CollectionRef, role: &str) -> RadianceResult<()> {
        if bindings.iter().any(|b| b.id == id) {
            return Err(RadianceError::AlreadyExists(format!("collection {} as {role}", id.raw())));
        }
        bindings.push(Binding { id, store });
        Ok(())
    }

    /// Appends a system to the chain.
    pub fn add_system(&mut self, system: System<ScratchStack>) -> SystemId {
        self.systems.push(system)
    }

    /// Removes a system from the chain.
    pub fn erase_system(&mut self, id: SystemId) -> bool {
        self.systems.erase(id)
    }

    /// Skips source rows whose records `predicate` rejects. It receives one
    /// record per source, in binding order.
    pub fn set_select<P>(&mut self, predicate: P)
    where
        P: Fn(&[&[u8]]) -> bool + Send + Sync + 'static,
    {
        self.select = Some(Arc::new(predicate));
    }

    /// Bound source collections.
    pub fn sources(&self) -> impl Iterator<Item = CollectionId> + '_ {
        self.sources.iter().map(|b| b.id)
    }

    /// Bound sink collections.
    pub fn sinks(&self) -> impl Iterator<Item = CollectionId> + '_ {
        self.sinks.iter().map(|b| b.id)
    }

    /// Runs one full pass with per-worker stacks of `scratch_capacity` bytes.
    pub fn run(&self, scratch_capacity: usize) -> PassReport {
        let (mut report, staged) = if self.sources.is_empty() {
            self.generate(scratch_capacity)
        } else {
            self.read(scratch_capacity)
        };

        for sink in &self.sinks {
            let mut store = sink.store.write();
            for (row, record) in &staged {
                match store.mutate(record) {
                    Ok(()) => report.committed += 1,
                    Err(error) => report.failures.push(RowFailure {
                        row: *row,
                        error,
                    }),
                }
            }
        }

        report.failures.sort_by_key(|failure| failure.row);
        report
    }

    fn read(&self, scratch_capacity: usize) -> (PassReport, Vec<(usize, Vec<u8>)>) {
        let guards: Vec<_> = self.sources.iter().map(|source| source.store.read()).collect();
        let stores: Vec<&dyn Collection> = guards.iter().map(|guard| &**guard).collect();
        let counts: Vec<u64> = stores.iter().map(|store| store.count()).collect();
        let shortest = counts.iter().copied().min().unwrap_or(0);
        if counts.iter().any(|count| *count != shortest) {
            tracing::debug!(?counts, rows = shortest, "sources differ in length, reading the shortest");
        }
        let count = usize::try_from(shortest).unwrap_or(usize::MAX);
        let stores = stores.as_slice();

        let (report, mut staged) = (0..count)
            .into_par_iter()
            .fold(
                || (ScratchStack::new(scratch_capacity), PassReport::default(), Vec::new()),
                |(mut scratch, mut report, mut staged), row| {
                    report.rows += 1;
                    scratch.clear();
                    match self.process(stores, row, &mut scratch) {
                        Ok(Some(record)) => staged.push((row, record)),
                        Ok(None) => {}
                        Err(error) => report.failures.push(RowFailure { row, error }),
                    }
                    (scratch, report, staged)
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

        staged.sort_unstable_by_key(|(row, _)| *row);
        (report, staged)
    }

    fn process(
        &self,
        stores: &[&dyn Collection],
        row: usize,
        scratch: &mut ScratchStack,
    ) -> RadianceResult<Option<Vec<u8>>> {
        for store in stores {
            store.copy(row as u64, scratch)?;
        }
        if let Some(select) = &self.select {
            if !select(&scratch.entries()) {
                return Ok(None);
            }
        }
        self.systems.run(scratch)?;
        Ok(scratch.top().ok().map(<[u8]>::to_vec))
    }

    fn generate(&self, scratch_capacity: usize) -> (PassReport, Vec<(usize, Vec<u8>)>) {
        let mut report = PassReport {
            rows: 1,
            ..PassReport::default()
        };
        let mut scratch = ScratchStack::new(scratch_capacity);
        let mut staged = Vec::new();
        match self.systems.run(&mut scratch) {
            Ok(()) => {
                if let Ok(record) = scratch.top() {
                    staged.push((0, record.to_vec()));
                }
            }
            Err(error) => report.failures.push(RowFailure { row: 0, error }),
        }
        (report, staged)
    }
}

struct Slot {
    pipeline: CollectionPipeline,
    policy: Option<ExecutionPolicy>,
}

/// A namespace of pipelines with a tick-driven scheduler.
pub struct Program {
    id: ProgramId,
    name: String,
    pipelines: BTreeMap<PipelineId, Slot>,
    /// `(priority, enable sequence, id)`, sorted.
    loop_order: Vec<(i8, u64, PipelineId)>,
    events: BTreeSet<PipelineId>,
    next_pipeline: u32,
    next_sequence: u64,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pipelines", &self.pipelines.len())
            .field("loop_order", &self.loop_order)
            .field("events", &self.events)
            .finish()
    }
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new(id: ProgramId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            pipelines: BTreeMap::new(),
            loop_order: Vec::new(),
            events: BTreeSet::new(),
            next_pipeline: 0,
            next_sequence: 0,
        }
    }

    /// The program's id.
    #[must_use]
    pub const fn id(&self) -> ProgramId {
        self.id
    }

    /// The program's name, the first segment of its collection paths.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a pipeline, not yet enabled.
    pub fn add_pipeline(&mut self, pipeline: CollectionPipeline) -> PipelineId {
        let id = PipelineId {
            program: self.id,
            index: self.next_pipeline,
        };
        self.next_pipeline += 1;
        self.pipelines.insert(id, Slot { pipeline, policy: None });
        id
    }

    /// A pipeline.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn pipeline(&self, id: PipelineId) -> RadianceResult<&CollectionPipeline> {
        self.slot(id).map(|slot| &slot.pipeline)
    }

    /// A pipeline, mutably.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn pipeline_mut(&mut self, id: PipelineId) -> RadianceResult<&mut CollectionPipeline> {
        let missing = self.missing(id);
        self.pipelines
            .get_mut(&id)
            .map(|slot| &mut slot.pipeline)
            .ok_or(missing)
    }

    /// The policy a pipeline is enabled with, if any.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn policy(&self, id: PipelineId) -> RadianceResult<Option<ExecutionPolicy>> {
        self.slot(id).map(|slot| slot.policy)
    }

    /// Schedules a pipeline. Re-enabling replaces its previous policy.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn enable(&mut self, id: PipelineId, policy: ExecutionPolicy) -> RadianceResult<()> {
        self.disable(id)?;
        match policy.trigger {
            Trigger::Loop => {
                let entry = (policy.priority, self.next_sequence, id);
                self.next_sequence += 1;
                let at = self.loop_order.partition_point(|queued| *queued < entry);
                self.loop_order.insert(at, entry);
            }
            Trigger::Event => {
                self.events.insert(id);
            }
        }
        if let Some(slot) = self.pipelines.get_mut(&id) {
            slot.policy = Some(policy);
        }
        tracing::debug!(program = %self.name, pipeline = id.index, ?policy, "pipeline enabled");
        Ok(())
    }

    /// Unschedules a pipeline. Disabling twice is not an error.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn disable(&mut self, id: PipelineId) -> RadianceResult<()> {
        self.pipeline(id)?;
        self.loop_order.retain(|(_, _, pipeline)| *pipeline != id);
        self.events.remove(&id);
        if let Some(slot) = self.pipelines.get_mut(&id) {
            slot.policy = None;
        }
        Ok(())
    }

    /// Unschedules and drops a pipeline.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if this program does not own `id`.
    pub fn remove(&mut self, id: PipelineId) -> RadianceResult<CollectionPipeline> {
        self.disable(id)?;
        let slot = self.pipelines.remove(&id).ok_or_else(|| self.missing(id))?;
        tracing::debug!(program = %self.name, pipeline = id.index, "pipeline removed");
        Ok(slot.pipeline)
    }

    /// Loop pipelines in execution order.
    pub fn loop_order(&self) -> impl Iterator<Item = PipelineId> + '_ {
        self.loop_order.iter().map(|(_, _, id)| *id)
    }

    /// Checks if `id` is enabled as an event pipeline.
    #[must_use]
    pub fn is_event(&self, id: PipelineId) -> bool {
        self.events.contains(&id)
    }

    /// Runs every loop pipeline once, in order, and reports each pass. Each
    /// pass completes, commits included, before the next begins.
    pub fn run_loop(&self, scratch_capacity: usize) -> Vec<(PipelineId, PassReport)> {
        self.loop_order
            .iter()
            .filter_map(|(_, _, id)| Some((*id, self.pipelines.get(id)?)))
            .map(|(id, slot)| (id, slot.pipeline.run(scratch_capacity)))
            .collect()
    }

    /// Runs one event pipeline.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if `id` is not enabled as an event pipeline here.
    pub fn run_event(&self, id: PipelineId, scratch_capacity: usize) -> RadianceResult<PassReport> {
        if !self.events.contains(&id) {
            return Err(RadianceError::DoesNotExist(format!(
                "event pipeline {} in {}",
                id.index, self.name
            )));
        }
        Ok(self.pipeline(id)?.run(scratch_capacity))
    }

    fn slot(&self, id: PipelineId) -> RadianceResult<&Slot> {
        self.pipelines.get(&id).ok_or_else(|| self.missing(id))
    }

    fn missing(&self, id: PipelineId) -> RadianceError {
        if id.program == self.id {
            RadianceError::DoesNotExist(format!("pipeline {} in {}", id.index, self.name))
        } else {
            RadianceError::DoesNotExist(format!(
                "pipeline {} of program {} in {}",
                id.index,
                id.program.raw(),
                self.name
            ))
        }
    }
}
