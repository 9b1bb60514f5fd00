//! # Record Codec
//!
//! One row crossing the collection boundary:
//!
//! ```text
//! [RecordHeader: 24 bytes][key: key_len bytes][value: value_len bytes]
//! ```
//!
//! The header carries the mutation kind, the identity scheme, the value
//! family tag, and the offset or raw handle for non-key identities.

use bytemuck::{Pod, Zeroable};
use radiance_core::{
    Element, Handle, IndexedBy, MutateBy, Mutation, RadianceError, RadianceResult, RowId,
    ScratchStack, System,
};

/// Marker trait for values that can cross the collection boundary.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Velocity {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Velocity {
///     const FAMILY: u32 = 2;
/// }
/// ```
pub trait Component: Pod + Send + Sync + 'static {
    /// Family tag checked on every decode. Must be unique per value type.
    const FAMILY: u32;
}

/// Fixed-size record prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RecordHeader {
    /// [`MutateBy`] tag.
    pub mutate_by: u16,
    /// [`IndexedBy`] tag, meaningful for writes.
    pub indexed_by: u16,
    /// [`Component::FAMILY`] of the value.
    pub family: u32,
    /// Row offset or raw handle for offset/handle writes.
    pub id: u64,
    /// Key bytes following the header.
    pub key_len: u32,
    /// Value bytes following the key.
    pub value_len: u32,
}

/// Bytes taken by [`RecordHeader`].
pub const HEADER_LEN: usize = std::mem::size_of::<RecordHeader>();

fn incompatible(what: impl Into<String>) -> RadianceError {
    RadianceError::IncompatibleDataTypes(what.into())
}

/// Total record length for key `K` and value `V`.
#[inline]
#[must_use]
pub const fn record_len<K: Pod, V: Component>() -> usize {
    HEADER_LEN + std::mem::size_of::<K>() + std::mem::size_of::<V>()
}

/// Pushes `mutation` as one record onto `scratch`.
///
/// # Errors
///
/// `MemoryOutOfBounds` if the record does not fit.
pub fn encode<K: Pod, V: Component>(
    scratch: &mut ScratchStack,
    mutation: &Mutation<K, V>,
) -> RadianceResult<()> {
    let zero_key = K::zeroed();
    let zero_value = V::zeroed();
    let (indexed_by, id, key, value) = match mutation {
        Mutation::Insert { key, value } => (IndexedBy::Key, 0, key, value),
        Mutation::Remove { key } => (IndexedBy::Key, 0, key, &zero_value),
        Mutation::Write(element) => match &element.id {
            RowId::Offset(row) => (IndexedBy::Offset, *row as u64, &zero_key, &element.value),
            RowId::Handle(handle) => (IndexedBy::Handle, handle.to_raw(), &zero_key, &element.value),
            RowId::Key(key) => (IndexedBy::Key, 0, key, &element.value),
        },
    };

    let key_len = std::mem::size_of::<K>();
    let header = RecordHeader {
        mutate_by: mutation.kind() as u16,
        indexed_by: indexed_by as u16,
        family: V::FAMILY,
        id,
        key_len: key_len as u32,
        value_len: std::mem::size_of::<V>() as u32,
    };

    let record = scratch.alloc(record_len::<K, V>())?;
    record[..HEADER_LEN].copy_from_slice(bytemuck::bytes_of(&header));
    record[HEADER_LEN..HEADER_LEN + key_len].copy_from_slice(bytemuck::bytes_of(key));
    record[HEADER_LEN + key_len..].copy_from_slice(bytemuck::bytes_of(value));
    Ok(())
}

/// Reads and checks the header of a record of `K`/`V`.
///
/// # Errors
///
/// `IncompatibleDataTypes` on a short record, another family, or sizes that
/// do not match `K`/`V`.
pub fn header<K: Pod, V: Component>(record: &[u8]) -> RadianceResult<RecordHeader> {
    if record.len() < HEADER_LEN {
        return Err(incompatible(format!("record of {} bytes has no header", record.len())));
    }
    let header: RecordHeader = bytemuck::pod_read_unaligned(&record[..HEADER_LEN]);
    if header.family != V::FAMILY {
        return Err(incompatible(format!(
            "record family {} read as family {}",
            header.family,
            V::FAMILY
        )));
    }
    if header.key_len as usize != std::mem::size_of::<K>()
        || header.value_len as usize != std::mem::size_of::<V>()
        || record.len() != record_len::<K, V>()
    {
        return Err(incompatible(format!(
            "record layout {}+{} does not match {}",
            header.key_len,
            header.value_len,
            std::any::type_name::<V>()
        )));
    }
    Ok(header)
}

/// Decodes a record back into a mutation.
///
/// # Errors
///
/// `IncompatibleDataTypes` as for [`header`] or on an unknown kind,
/// `UnknownIndexedByValue` on an unknown identity tag.
pub fn decode<K: Pod, V: Component>(record: &[u8]) -> RadianceResult<Mutation<K, V>> {
    let header = header::<K, V>(record)?;
    let key_end = HEADER_LEN + header.key_len as usize;
    let key: K = bytemuck::pod_read_unaligned(&record[HEADER_LEN..key_end]);
    let value: V = bytemuck::pod_read_unaligned(&record[key_end..]);

    Ok(match MutateBy::try_from(u32::from(header.mutate_by))? {
        MutateBy::Insert => Mutation::Insert { key, value },
        MutateBy::Remove => Mutation::Remove { key },
        MutateBy::Write => {
            let id = match IndexedBy::try_from(u32::from(header.indexed_by))? {
                IndexedBy::Offset => RowId::Offset(
                    usize::try_from(header.id)
                        .map_err(|_| RadianceError::MemoryOutOfBounds)?,
                ),
                IndexedBy::Handle => RowId::Handle(Handle::from_raw(header.id)),
                IndexedBy::Key => RowId::Key(key),
            };
            Mutation::Write(Element::new(id, value))
        }
    })
}

/// Reads the value of a record.
///
/// # Errors
///
/// As for [`header`].
pub fn value_of<K: Pod, V: Component>(record: &[u8]) -> RadianceResult<V> {
    let header = header::<K, V>(record)?;
    Ok(bytemuck::pod_read_unaligned(&record[HEADER_LEN + header.key_len as usize..]))
}

/// Reads the key of a record.
///
/// # Errors
///
/// As for [`header`].
pub fn key_of<K: Pod, V: Component>(record: &[u8]) -> RadianceResult<K> {
    let header = header::<K, V>(record)?;
    Ok(bytemuck::pod_read_unaligned(&record[HEADER_LEN..HEADER_LEN + header.key_len as usize]))
}

/// Edits the value of the record on top of `scratch` in place.
///
/// # Errors
///
/// `NullPointer` on an empty stack, otherwise as for [`header`].
pub fn update_top<K: Pod, V: Component>(
    scratch: &mut ScratchStack,
    update: impl FnOnce(&mut V),
) -> RadianceResult<()> {
    let record = scratch.top_mut()?;
    let header = header::<K, V>(record)?;
    let value_bytes = &mut record[HEADER_LEN + header.key_len as usize..];
    let mut value: V = bytemuck::pod_read_unaligned(value_bytes);
    update(&mut value);
    value_bytes.copy_from_slice(bytemuck::bytes_of(&value));
    Ok(())
}

/// Wraps a typed per-value update as a scratch-stack system.
pub fn system<K, V, F>(update: F) -> System<ScratchStack>
where
    K: Pod,
    V: Component,
    F: Fn(&mut V) + Send + Sync + 'static,
{
    System::new(move |scratch: &mut ScratchStack| update_top::<K, V>(scratch, &update))
}

/// Wraps a typed predicate over the first source's record as a pipeline
/// filter. Rows whose first record does not decode as `K`/`V` are rejected.
pub fn select<K, V, P>(predicate: P) -> impl Fn(&[&[u8]]) -> bool + Send + Sync + 'static
where
    K: Pod,
    V: Component,
    P: Fn(&K, &V) -> bool + Send + Sync + 'static,
{
    move |records: &[&[u8]]| {
        let Some(record) = records.first() else {
            return false;
        };
        match (key_of::<K, V>(record), value_of::<K, V>(record)) {
            (Ok(key), Ok(value)) => predicate(&key, &value),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Heat(f32);

    impl Component for Heat {
        const FAMILY: u32 = 11;
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Charge(f32);

    impl Component for Charge {
        const FAMILY: u32 = 12;
    }

    #[test]
    fn test_header_is_24_bytes() {
        assert_eq!(HEADER_LEN, 24);
        assert_eq!(record_len::<u32, Heat>(), 32);
    }

    #[test]
    fn test_write_by_handle_decodes() {
        let mut scratch = ScratchStack::new(128);
        let handle = Handle::new(3, 9);
        let mutation: Mutation<u32, Heat> = Mutation::Write(Element::new(RowId::Handle(handle), Heat(2.5)));
        encode(&mut scratch, &mutation).unwrap();
        assert_eq!(decode::<u32, Heat>(scratch.top().unwrap()).unwrap(), mutation);
    }

    #[test]
    fn test_other_family_is_incompatible() {
        let mut scratch = ScratchStack::new(128);
        encode::<u32, Heat>(&mut scratch, &Mutation::Insert { key: 1, value: Heat(1.0) }).unwrap();
        assert!(matches!(
            decode::<u32, Charge>(scratch.top().unwrap()),
            Err(RadianceError::IncompatibleDataTypes(_))
        ));
        assert!(matches!(
            decode::<u64, Heat>(scratch.top().unwrap()),
            Err(RadianceError::IncompatibleDataTypes(_))
        ));
    }

    #[test]
    fn test_unknown_indexed_by_tag() {
        let mut scratch = ScratchStack::new(128);
        encode::<u32, Heat>(&mut scratch, &Mutation::Write(Element::new(RowId::Key(4), Heat(0.0)))).unwrap();
        let record = scratch.top_mut().unwrap();
        let mut header: RecordHeader = bytemuck::pod_read_unaligned(&record[..HEADER_LEN]);
        header.indexed_by = 7;
        record[..HEADER_LEN].copy_from_slice(bytemuck::bytes_of(&header));

        assert_eq!(
            decode::<u32, Heat>(scratch.top().unwrap()),
            Err(RadianceError::UnknownIndexedByValue(7))
        );
    }

    #[test]
    fn test_short_record() {
        assert!(decode::<u32, Heat>(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_typed_system_and_select() {
        let mut scratch = ScratchStack::new(128);
        encode::<u32, Heat>(&mut scratch, &Mutation::Write(Element::new(RowId::Key(8), Heat(3.0)))).unwrap();

        system::<u32, Heat, _>(|heat| heat.0 *= 2.0).run(&mut scratch).unwrap();
        assert_eq!(value_of::<u32, Heat>(scratch.top().unwrap()), Ok(Heat(6.0)));
        assert_eq!(key_of::<u32, Heat>(scratch.top().unwrap()), Ok(8));

        let hot = select::<u32, Heat, _>(|_, heat| heat.0 > 5.0);
        let cold = select::<u32, Charge, _>(|_, _| true);
        assert!(hot(&scratch.entries()));
        assert!(!cold(&scratch.entries()));
        let none: &[&[u8]] = &[];
        assert!(!hot(none));
    }
}
