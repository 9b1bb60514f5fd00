//! # Row Identity
//!
//! A row can be addressed three ways:
//! - By offset: its current physical index (unstable across removals)
//! - By handle: a stable generational identifier
//! - By key: the domain identity supplied at insert

use std::hash::Hash;

use crate::error::RadianceError;

/// Stable identifier for a table row.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index of the handle slot
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// A slot's generation is bumped every time its row is removed, so a handle
/// kept past `remove` never aliases the row that later reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this handle is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Raw packed representation.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from [`Handle::to_raw`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

/// Which identity scheme an [`Element`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IndexedBy {
    /// Current physical row index.
    Offset = 1,
    /// Stable generational handle.
    Handle = 2,
    /// Domain key.
    Key = 3,
}

impl TryFrom<u32> for IndexedBy {
    type Error = RadianceError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Offset),
            2 => Ok(Self::Handle),
            3 => Ok(Self::Key),
            other => Err(RadianceError::UnknownIndexedByValue(other)),
        }
    }
}

/// Identity of one row under one of the three schemes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RowId<K> {
    /// Physical row index at read time.
    Offset(usize),
    /// Stable handle.
    Handle(Handle),
    /// Domain key.
    Key(K),
}

impl<K> RowId<K> {
    /// The scheme this identity uses.
    #[inline]
    #[must_use]
    pub const fn indexed_by(&self) -> IndexedBy {
        match self {
            Self::Offset(_) => IndexedBy::Offset,
            Self::Handle(_) => IndexedBy::Handle,
            Self::Key(_) => IndexedBy::Key,
        }
    }
}

/// One row's identity plus payload, moved from Reader through Systems to Writer.
#[derive(Clone, Debug, PartialEq)]
pub struct Element<K, V> {
    /// Where the row was read from and where it is written back.
    pub id: RowId<K>,
    /// The payload.
    pub value: V,
}

impl<K, V> Element<K, V> {
    /// Creates an element.
    #[inline]
    pub const fn new(id: RowId<K>, value: V) -> Self {
        Self { id, value }
    }

    /// The identity scheme of this element.
    #[inline]
    #[must_use]
    pub const fn indexed_by(&self) -> IndexedBy {
        self.id.indexed_by()
    }
}

/// Bounds every table key satisfies in a parallel pass.
pub trait RowKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> RowKey for T {}

/// Bounds every table value satisfies in a parallel pass.
pub trait RowValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> RowValue for T {}
