//! # Systems
//!
//! A system is one per-row transform over a frame. Systems run in explicit
//! registration order, followed by a single terminal system.

use std::fmt;
use std::sync::Arc;

use crate::error::RadianceResult;

type SystemFn<F> = dyn Fn(&mut F) -> RadianceResult<()> + Send + Sync;

/// A type-erased per-row operation over scratch `F`.
///
/// Cloning a system is cheap: the closure is shared.
pub struct System<F> {
    run: Arc<SystemFn<F>>,
}

impl<F> System<F> {
    /// Wraps a closure as a system.
    pub fn new<S>(run: S) -> Self
    where
        S: Fn(&mut F) -> RadianceResult<()> + Send + Sync + 'static,
    {
        Self { run: Arc::new(run) }
    }

    /// A system that leaves the frame untouched.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    /// Runs the system once.
    ///
    /// # Errors
    ///
    /// Whatever the wrapped closure reports.
    #[inline]
    pub fn run(&self, frame: &mut F) -> RadianceResult<()> {
        (self.run)(frame)
    }
}

impl<F> Clone for System<F> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<F> fmt::Debug for System<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System").finish_non_exhaustive()
    }
}

/// Identifies a system inside one executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemId(u64);

impl SystemId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// An ordered chain of systems plus one terminal system.
pub struct SystemExecutor<F> {
    systems: Vec<(SystemId, System<F>)>,
    back: System<F>,
    next_id: u64,
}

impl<F> Clone for SystemExecutor<F> {
    fn clone(&self) -> Self {
        Self {
            systems: self.systems.clone(),
            back: self.back.clone(),
            next_id: self.next_id,
        }
    }
}

impl<F> fmt::Debug for SystemExecutor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemExecutor")
            .field("systems", &self.systems.len())
            .finish_non_exhaustive()
    }
}

impl<F> Default for SystemExecutor<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> SystemExecutor<F> {
    /// Creates an empty chain whose terminal system does nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_back(System::noop())
    }

    /// Creates an empty chain with the given terminal system.
    #[must_use]
    pub fn with_back(back: System<F>) -> Self {
        Self {
            systems: Vec::new(),
            back,
            next_id: 0,
        }
    }

    /// Appends a system, returning its id.
    pub fn push(&mut self, system: System<F>) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;
        self.systems.push((id, system));
        id
    }

    /// Appends systems in order.
    pub fn push_all<I>(&mut self, systems: I) -> Vec<SystemId>
    where
        I: IntoIterator<Item = System<F>>,
    {
        systems.into_iter().map(|system| self.push(system)).collect()
    }

    /// Removes a system, keeping the order of the rest.
    ///
    /// Returns `false` if no system has that id.
    pub fn erase(&mut self, id: SystemId) -> bool {
        match self.systems.iter().position(|(sid, _)| *sid == id) {
            Some(pos) => {
                self.systems.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Replaces the terminal system.
    pub fn set_back(&mut self, back: System<F>) {
        self.back = back;
    }

    /// The terminal system.
    #[must_use]
    pub fn back(&self) -> &System<F> {
        &self.back
    }

    /// Number of chained systems, not counting the terminal one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Checks if no system is chained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Ids in execution order.
    pub fn ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.systems.iter().map(|(id, _)| *id)
    }

    /// Runs every system in order, then the terminal one.
    ///
    /// # Errors
    ///
    /// The first error reported; later systems do not run.
    pub fn run(&self, frame: &mut F) -> RadianceResult<()> {
        for (_, system) in &self.systems {
            system.run(frame)?;
        }
        self.back.run(frame)
    }
}
