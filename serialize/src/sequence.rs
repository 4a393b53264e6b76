//! Sequence containers (§4.5 "Containers") and the view-producing
//! deserialization paths that specialize on whether the element type is
//! trivially serializable (§4.6).

use std::marker::PhantomData;

use pgas_container::view::{SliceView, View};

use crate::{Error, Reader, Serializable, Writer};

impl<'de, T: Serializable<'de> + Clone> Serializable<'de> for Vec<T> {
    const IS_TRIVIALLY_SERIALIZABLE: bool = false;
    const REFERENCES_BUFFER: bool = T::REFERENCES_BUFFER;
    const SKIP_IS_FAST: bool = false;

    fn ubound(&self) -> Option<usize> {
        if T::IS_TRIVIALLY_SERIALIZABLE {
            Some(8 + self.len() * std::mem::size_of::<T>())
        } else {
            None
        }
    }

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        for item in self {
            item.serialize(writer);
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::deserialize(reader)?);
        }
        Ok(out)
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        let len = reader.read_len()?;
        for _ in 0..len {
            T::skip(reader)?;
        }
        Ok(())
    }
}

/// Reads a length-prefixed sequence of trivially-serializable `T` as an
/// in-place [`SliceView`] over the wire buffer: no per-element copy, no
/// per-element deserialize call.
///
/// # Panics
///
/// Panics (via a debug assertion) if `T` does not actually satisfy
/// `IS_TRIVIALLY_SERIALIZABLE`, and if the wire bytes aren't aligned for
/// `T` — the latter can happen if the buffer this reader was built from
/// wasn't allocated with `T`'s alignment in mind.
pub fn deserialize_trivial_view<'de, T>(reader: &mut Reader<'de>) -> Result<SliceView<'de, T>, Error>
where
    T: Serializable<'de> + Copy + 'static,
{
    debug_assert!(T::IS_TRIVIALLY_SERIALIZABLE, "deserialize_trivial_view called on a non-trivial element type");
    let len = reader.read_len()?;
    let byte_len = len * std::mem::size_of::<T>();
    let bytes = reader.read_bytes(byte_len)?;
    assert_eq!(
        bytes.as_ptr() as usize % std::mem::align_of::<T>(),
        0,
        "wire buffer is not aligned for in-place view deserialization of this type"
    );
    // SAFETY: `bytes` is exactly `len * size_of::<T>()` bytes (checked
    // above) and aligned for `T` (asserted above); `T: Copy` rules out
    // double-drop or uninitialized-byte hazards from reinterpreting the
    // bytes in place. This mirrors the trivially-serializable elements
    // being laid out contiguously on the write side by `Vec<T>::serialize`.
    let slice: &'de [T] = unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<T>(), len) };
    Ok(View::new(slice.iter(), len))
}

/// An iterator that deserializes one `T` per `next()` call from a private
/// cursor into the wire buffer.
pub struct LazySeqIter<'de, T> {
    reader: Reader<'de>,
    remaining: usize,
    _marker: PhantomData<T>,
}

impl<'de, T: Serializable<'de>> Iterator for LazySeqIter<'de, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        T::deserialize(&mut self.reader).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'de, T> Clone for LazySeqIter<'de, T> {
    fn clone(&self) -> Self {
        LazySeqIter { reader: self.reader, remaining: self.remaining, _marker: PhantomData }
    }
}

/// Reads a length-prefixed sequence of non-trivial `T` as a [`View`] that
/// deserializes each element lazily, on dereference, rather than up front.
pub fn deserialize_lazy_view<'de, T>(reader: &mut Reader<'de>) -> Result<View<LazySeqIter<'de, T>>, Error>
where
    T: Serializable<'de>,
{
    let len = reader.read_len()?;
    let inner = *reader;
    for _ in 0..len {
        T::skip(reader)?;
    }
    Ok(View::new(LazySeqIter { reader: inner, remaining: len, _marker: PhantomData }, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_bytes, to_bytes};

    #[test]
    fn vec_of_u32_roundtrips_owned() {
        let value = vec![1u32, 2, 3, 4, 5];
        let bytes = to_bytes(&value);
        let back: Vec<u32> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn vec_of_strings_roundtrips() {
        let value = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let bytes = to_bytes(&value);
        let back: Vec<String> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn trivial_view_reads_in_place() {
        let value = vec![10u32, 20, 30, 40];
        let bytes = to_bytes(&value);
        let mut reader = Reader::new(&bytes);
        let view = deserialize_trivial_view::<u32>(&mut reader).unwrap();
        assert_eq!(view.len(), 4);
        let collected: Vec<u32> = view.into_iter().copied().collect();
        assert_eq!(collected, value);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn lazy_view_deserializes_on_demand_and_advances_reader() {
        let value = vec!["one".to_string(), "two".to_string()];
        let bytes = to_bytes(&value);
        let mut reader = Reader::new(&bytes);
        let view = deserialize_lazy_view::<String>(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0, "outer reader should skip past the whole sequence eagerly");
        let collected: Vec<String> = view.into_iter().collect();
        assert_eq!(collected, value);
    }
}
