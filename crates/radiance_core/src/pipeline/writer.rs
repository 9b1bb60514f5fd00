//! # Writer
//!
//! Commits a chain's final result into the sink.

use std::fmt;
use std::sync::Arc;

use super::mutation::MutationBuffer;
use super::reader::RowFrame;
use crate::error::RadianceResult;
use crate::exec::System;
use crate::storage::{Element, RowKey, RowValue, Table};

/// How results reach the sink.
pub enum Writer<K, V> {
    /// Written during the pass, by identity.
    Direct,
    /// Queued as `Write` mutations and applied when the buffer is flushed.
    Deferred(Arc<MutationBuffer<K, V>>),
}

impl<K, V> Clone for Writer<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct => Self::Direct,
            Self::Deferred(buffer) => Self::Deferred(Arc::clone(buffer)),
        }
    }
}

impl<K, V> fmt::Debug for Writer<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Deferred(buffer) => f.debug_tuple("Deferred").field(buffer).finish(),
        }
    }
}

impl<K: RowKey, V: RowValue> Writer<K, V> {
    /// A deferred writer over a fresh buffer, plus that buffer.
    #[must_use]
    pub fn deferred() -> (Self, Arc<MutationBuffer<K, V>>) {
        let buffer = Arc::new(MutationBuffer::new());
        (Self::Deferred(Arc::clone(&buffer)), buffer)
    }

    /// Checks if results are written during the pass.
    #[inline]
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }

    /// The terminal system to run after the chain.
    ///
    /// A direct writer's terminal leaves the result in the frame for the pass
    /// to commit. A deferred writer's terminal moves it into the buffer.
    #[must_use]
    pub fn terminal(&self) -> System<RowFrame<K, V>> {
        match self {
            Self::Direct => System::noop(),
            Self::Deferred(buffer) => {
                let buffer = Arc::clone(buffer);
                System::new(move |frame: &mut RowFrame<K, V>| {
                    buffer.write(frame.take_result()?);
                    Ok(())
                })
            }
        }
    }

    /// Commits one element outside of a parallel pass.
    ///
    /// # Errors
    ///
    /// `DoesNotExist` if a direct write's identity does not resolve.
    pub fn commit(&self, sink: &mut Table<K, V>, element: Element<K, V>) -> RadianceResult<()> {
        match self {
            Self::Direct => sink.commit(element),
            Self::Deferred(buffer) => {
                buffer.write(element);
                Ok(())
            }
        }
    }
}
