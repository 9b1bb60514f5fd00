//! # Frame
//!
//! Fixed-capacity scratch stack passed through a chain of systems.

use crate::error::{RadianceError, RadianceResult};

/// Bounded per-worker scratch stack holding at most one current result.
///
/// A worker builds one frame and reuses it for every row it processes, so
/// the slot storage is allocated once per worker, not once per row.
///
/// The current result is always the top slot. Systems read it, and usually
/// replace it with a new value before the next system runs.
#[derive(Debug)]
pub struct Frame<T> {
    /// Stack slots, bottom first.
    slots: Vec<T>,
    /// Maximum number of slots.
    capacity: usize,
    /// Whether the top slot is the current result.
    has_result: bool,
}

impl<T> Frame<T> {
    /// Creates an empty frame.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of values the frame can hold at once
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            has_result: false,
        }
    }

    /// Returns the total capacity in slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of occupied slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if no slot is occupied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.slots.len()
    }

    /// Pushes a value and makes it the current result.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if the frame is full.
    pub fn push(&mut self, value: T) -> RadianceResult<()> {
        if self.slots.len() >= self.capacity {
            return Err(RadianceError::MemoryOutOfBounds);
        }
        self.slots.push(value);
        self.has_result = true;
        Ok(())
    }

    /// Pushes a default value and returns it as the current result.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if the frame is full.
    pub fn alloc(&mut self) -> RadianceResult<&mut T>
    where
        T: Default,
    {
        self.push(T::default())?;
        self.result_mut()
    }

    /// Replaces the current result, or pushes one if there is none.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if there is no result and the frame is full.
    pub fn replace_result(&mut self, value: T) -> RadianceResult<()> {
        match self.slots.last_mut() {
            Some(top) if self.has_result => {
                *top = value;
                Ok(())
            }
            _ => self.push(value),
        }
    }

    /// The current result.
    ///
    /// # Errors
    ///
    /// `NullPointer` if no result has been pushed.
    #[inline]
    pub fn result(&self) -> RadianceResult<&T> {
        if !self.has_result {
            return Err(RadianceError::NullPointer);
        }
        self.slots.last().ok_or(RadianceError::NullPointer)
    }

    /// The current result, mutably.
    ///
    /// # Errors
    ///
    /// `NullPointer` if no result has been pushed.
    #[inline]
    pub fn result_mut(&mut self) -> RadianceResult<&mut T> {
        if !self.has_result {
            return Err(RadianceError::NullPointer);
        }
        self.slots.last_mut().ok_or(RadianceError::NullPointer)
    }

    /// Pops the current result out of the frame.
    ///
    /// # Errors
    ///
    /// `NullPointer` if no result has been pushed.
    pub fn take_result(&mut self) -> RadianceResult<T> {
        if !self.has_result {
            return Err(RadianceError::NullPointer);
        }
        self.has_result = false;
        self.slots.pop().ok_or(RadianceError::NullPointer)
    }

    /// Empties the frame. Capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.slots.clear();
        self.has_result = false;
    }
}
