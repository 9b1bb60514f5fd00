//! # Registries
//!
//! Namespaces for collections and programs. Collections are addressed by
//! `"<program>/<name>"` paths; several paths may alias one store.

use std::collections::HashMap;

use radiance_core::{RadianceError, RadianceResult};

use crate::collection::CollectionRef;
use crate::program::Program;

/// Builds the registry path of `name` inside `program`.
#[must_use]
pub fn path(program: &str, name: &str) -> String {
    format!("{program}/{name}")
}

/// Identifies one backing store. Aliased paths share an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(u32);

impl CollectionId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Path -> store table. Owns every registered store.
#[derive(Default)]
pub struct CollectionRegistry {
    paths: HashMap<String, CollectionId>,
    stores: Vec<CollectionRef>,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new store at `path`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `path` already resolves.
    pub fn add(&mut self, path: &str, store: CollectionRef) -> RadianceResult<CollectionId> {
        if self.paths.contains_key(path) {
            return Err(RadianceError::AlreadyExists(path.to_owned()));
        }
        let id = CollectionId(self.stores.len() as u32);
        self.stores.push(store);
        self.paths.insert(path.to_owned(), id);
        tracing::debug!(path, id = id.0, "collection registered");
        Ok(id)
    }

    /// Resolves a path.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if nothing is registered at `path`.
    pub fn resolve(&self, path: &str) -> RadianceResult<(CollectionId, CollectionRef)> {
        let id = *self
            .paths
            .get(path)
            .ok_or_else(|| RadianceError::DoesNotExist(path.to_owned()))?;
        Ok((id, self.stores[id.0 as usize].clone()))
    }

    /// The store behind an id.
    #[must_use]
    pub fn store(&self, id: CollectionId) -> Option<&CollectionRef> {
        self.stores.get(id.0 as usize)
    }

    /// Makes `dst` resolve to the same store as `src`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `dst` already resolves, `DoesNotExist` if `src`
    /// does not.
    pub fn share(&mut self, src: &str, dst: &str) -> RadianceResult<CollectionId> {
        if self.paths.contains_key(dst) {
            return Err(RadianceError::AlreadyExists(dst.to_owned()));
        }
        let (id, _) = self.resolve(src)?;
        self.paths.insert(dst.to_owned(), id);
        tracing::debug!(src, dst, id = id.0, "collection shared");
        Ok(id)
    }

    /// Number of registered paths, aliases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Checks if no path is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Identifies a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(u32);

impl ProgramId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Name -> program table. Programs are kept in creation order.
#[derive(Default)]
pub struct ProgramRegistry {
    names: HashMap<String, ProgramId>,
    programs: Vec<Program>,
}

impl ProgramRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a program.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken.
    pub fn create(&mut self, name: &str) -> RadianceResult<ProgramId> {
        if self.names.contains_key(name) {
            return Err(RadianceError::AlreadyExists(name.to_owned()));
        }
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(Program::new(id, name));
        self.names.insert(name.to_owned(), id);
        tracing::debug!(name, id = id.0, "program created");
        Ok(id)
    }

    /// Looks a program up by name.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<ProgramId> {
        self.names.get(name).copied()
    }

    /// A program.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an id this registry never issued.
    pub fn get(&self, id: ProgramId) -> RadianceResult<&Program> {
        self.programs
            .get(id.0 as usize)
            .ok_or_else(|| RadianceError::DoesNotExist(format!("program {}", id.0)))
    }

    /// A program, mutably.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` for an id this registry never issued.
    pub fn get_mut(&mut self, id: ProgramId) -> RadianceResult<&mut Program> {
        self.programs
            .get_mut(id.0 as usize)
            .ok_or_else(|| RadianceError::DoesNotExist(format!("program {}", id.0)))
    }

    /// Programs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    /// Number of programs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Checks if no program exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
