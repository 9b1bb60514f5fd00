//! # Scratch Stack
//!
//! A bounded byte stack for rows serialized across a collection boundary.
//!
//! Each entry is laid out as `[payload][len: u64 LE]`, so the top entry can be
//! found from the end of the stack without a separate index.

use bytemuck::Pod;

use crate::error::{RadianceError, RadianceResult};

/// Size of the length footer after every entry.
const FOOTER: usize = std::mem::size_of::<u64>();

/// A bounded stack of byte entries.
///
/// # Thread Safety
///
/// Not shared. Each worker owns its own stack for the length of a pass.
///
/// # Example
///
/// ```rust,ignore
/// let mut scratch = ScratchStack::new(256);
/// scratch.push_pod(&42u32)?;
/// assert_eq!(scratch.top_as::<u32>()?, 42);
/// scratch.pop()?;
/// ```
#[derive(Debug)]
pub struct ScratchStack {
    /// Packed entries and footers.
    bytes: Vec<u8>,
    /// Total capacity in bytes, footers included.
    capacity: usize,
    /// Number of live entries.
    entries: usize,
}

impl ScratchStack {
    /// Creates an empty stack.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes, including an 8-byte footer per entry
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            entries: 0,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the used space in bytes.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.bytes.len()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries
    }

    /// Checks if the stack holds no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Allocates a zeroed entry of `len` bytes on top of the stack.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if the entry and its footer do not fit.
    pub fn alloc(&mut self, len: usize) -> RadianceResult<&mut [u8]> {
        let needed = len.checked_add(FOOTER).ok_or(RadianceError::MemoryOutOfBounds)?;
        if needed > self.remaining() {
            return Err(RadianceError::MemoryOutOfBounds);
        }

        let start = self.bytes.len();
        self.bytes.resize(start + len, 0);
        self.bytes.extend_from_slice(&(len as u64).to_le_bytes());
        self.entries += 1;
        Ok(&mut self.bytes[start..start + len])
    }

    /// Pushes a copy of `data` as a new entry.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if it does not fit.
    pub fn push_bytes(&mut self, data: &[u8]) -> RadianceResult<()> {
        self.alloc(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Pushes the bytes of a plain-old-data value as a new entry.
    ///
    /// # Errors
    ///
    /// `MemoryOutOfBounds` if it does not fit.
    pub fn push_pod<T: Pod>(&mut self, value: &T) -> RadianceResult<()> {
        self.push_bytes(bytemuck::bytes_of(value))
    }

    /// The top entry.
    ///
    /// # Errors
    ///
    /// `NullPointer` if the stack is empty.
    pub fn top(&self) -> RadianceResult<&[u8]> {
        let (start, end) = self.top_range()?;
        Ok(&self.bytes[start..end])
    }

    /// The top entry, mutably. Its length cannot change.
    ///
    /// # Errors
    ///
    /// `NullPointer` if the stack is empty.
    pub fn top_mut(&mut self) -> RadianceResult<&mut [u8]> {
        let (start, end) = self.top_range()?;
        Ok(&mut self.bytes[start..end])
    }

    /// The entry `depth` places below the top; `0` is the top.
    ///
    /// # Errors
    ///
    /// `NullPointer` if the stack holds `depth` entries or fewer.
    pub fn entry(&self, depth: usize) -> RadianceResult<&[u8]> {
        if depth >= self.entries {
            return Err(RadianceError::NullPointer);
        }
        let mut end = self.bytes.len();
        for _ in 0..depth {
            end = Self::range_ending_at(&self.bytes, end)?.0;
        }
        let (start, payload_end) = Self::range_ending_at(&self.bytes, end)?;
        Ok(&self.bytes[start..payload_end])
    }

    /// Every entry, bottom first.
    #[must_use]
    pub fn entries(&self) -> Vec<&[u8]> {
        let mut entries = Vec::with_capacity(self.entries);
        let mut end = self.bytes.len();
        for _ in 0..self.entries {
            let Ok((start, payload_end)) = Self::range_ending_at(&self.bytes, end) else {
                break;
            };
            entries.push(&self.bytes[start..payload_end]);
            end = start;
        }
        entries.reverse();
        entries
    }

    /// Reads the top entry as a plain-old-data value.
    ///
    /// # Errors
    ///
    /// `NullPointer` if the stack is empty, `IncompatibleDataTypes` if the
    /// entry's size differs from `T`'s.
    pub fn top_as<T: Pod>(&self) -> RadianceResult<T> {
        let top = self.top()?;
        if top.len() != std::mem::size_of::<T>() {
            return Err(RadianceError::IncompatibleDataTypes(format!(
                "entry of {} bytes read as {} ({} bytes)",
                top.len(),
                std::any::type_name::<T>(),
                std::mem::size_of::<T>()
            )));
        }
        Ok(bytemuck::pod_read_unaligned(top))
    }

    /// Drops the top entry.
    ///
    /// # Errors
    ///
    /// `NullPointer` if the stack is empty.
    pub fn pop(&mut self) -> RadianceResult<()> {
        let (start, _) = self.top_range()?;
        self.bytes.truncate(start);
        self.entries -= 1;
        Ok(())
    }

    /// Drops every entry. Capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.entries = 0;
    }

    fn top_range(&self) -> RadianceResult<(usize, usize)> {
        if self.entries == 0 {
            return Err(RadianceError::NullPointer);
        }
        Self::range_ending_at(&self.bytes, self.bytes.len())
    }

    /// Payload range of the entry whose footer ends at `end`.
    fn range_ending_at(bytes: &[u8], end: usize) -> RadianceResult<(usize, usize)> {
        let payload_end = end.checked_sub(FOOTER).ok_or(RadianceError::MemoryOutOfBounds)?;
        let mut footer = [0u8; FOOTER];
        footer.copy_from_slice(&bytes[payload_end..end]);
        let len = usize::try_from(u64::from_le_bytes(footer))
            .map_err(|_| RadianceError::MemoryOutOfBounds)?;
        let start = payload_end.checked_sub(len).ok_or(RadianceError::MemoryOutOfBounds)?;
        Ok((start, payload_end))
    }
}
