//! Wire serialization (§4.5) and the non-owning view types built on it (§4.6).
//!
//! [`Serializable`] is the one trait a type implements to travel over the
//! wire: it bundles the compile-time facts the RPC engine needs to choose a
//! protocol (is this trivially copyable, does deserializing it borrow from
//! the buffer, can its length be skipped without materializing it) together
//! with the `serialize` / `deserialize` / `skip` operations themselves.
//!
//! Two writer modes exist because the caller sometimes already knows the
//! exact encoded size (an eager-medium active message sized from
//! `ubound`) and sometimes doesn't (a rendezvous payload built once and
//! measured after the fact): [`BoundedWriter`] writes directly into a
//! pre-sized buffer, [`UnboundedWriter`] grows a scratch `Vec` and hands it
//! back whole.

#![forbid(missing_docs)]

mod associative;
mod primitive;
mod sequence;

pub use associative::*;
pub use primitive::*;
pub use sequence::*;

use byteorder::{ByteOrder, LittleEndian};

/// Failure reading a wire encoding.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The reader ran out of bytes before an encoding finished.
    #[error("unexpected end of buffer: wanted {wanted} bytes, {available} available")]
    Eof {
        /// Bytes the read required.
        wanted: usize,
        /// Bytes actually left in the buffer.
        available: usize,
    },
}

/// Destination for serialized bytes.
///
/// Implementations differ only in whether they know the total length ahead
/// of time; the [`Serializable`] impls that write through this trait don't
/// need to care which one they were handed.
pub trait Writer {
    /// Appends `bytes` to the output.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Appends a little-endian `u64` length prefix.
    fn write_len(&mut self, len: usize) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, len as u64);
        self.write_bytes(&buf);
    }
}

/// Writes into a buffer whose final size was computed in advance via
/// [`Serializable::ubound`].
///
/// Writing past the pre-sized capacity is a logic error (it means `ubound`
/// under-counted) and panics rather than silently reallocating, since a
/// reallocation here would defeat the point of sizing the buffer up front.
pub struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> BoundedWriter<'a> {
    /// Wraps `buf`, starting the write cursor at the front.
    pub fn new(buf: &'a mut [u8]) -> Self {
        BoundedWriter { buf, offset: 0 }
    }

    /// The number of bytes written so far.
    pub fn written(&self) -> usize {
        self.offset
    }
}

impl Writer for BoundedWriter<'_> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }
}

/// Writes into a growable scratch buffer, for values whose encoded size
/// isn't known (or isn't worth computing) ahead of time.
#[derive(Default)]
pub struct UnboundedWriter {
    buf: Vec<u8>,
}

impl UnboundedWriter {
    /// Starts an empty scratch buffer.
    pub fn new() -> Self {
        UnboundedWriter { buf: Vec::new() }
    }

    /// Starts an empty scratch buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        UnboundedWriter { buf: Vec::with_capacity(capacity) }
    }

    /// Consumes the writer, returning the bytes accumulated.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Writer for UnboundedWriter {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// Cursor over an immutable wire buffer.
///
/// `'de` is the buffer's lifetime; types whose deserialized form borrows
/// from the wire (views, `&str`) carry `'de` through into their own type.
#[derive(Clone, Copy)]
pub struct Reader<'de> {
    bytes: &'de [u8],
    offset: usize,
}

impl<'de> Reader<'de> {
    /// Starts a cursor at the front of `bytes`.
    pub fn new(bytes: &'de [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Borrows the next `len` bytes and advances past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'de [u8], Error> {
        if self.remaining() < len {
            return Err(Error::Eof { wanted: len, available: self.remaining() });
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.bytes[start..self.offset])
    }

    /// Reads a little-endian `u64` length prefix, as written by [`Writer::write_len`].
    pub fn read_len(&mut self) -> Result<usize, Error> {
        let bytes = self.read_bytes(8)?;
        Ok(LittleEndian::read_u64(bytes) as usize)
    }

    /// Skips `len` bytes without interpreting them.
    pub fn skip_bytes(&mut self, len: usize) -> Result<(), Error> {
        self.read_bytes(len).map(|_| ())
    }
}

/// A type that can travel over the wire.
///
/// `'de` parameterizes the lifetime a deserialized value may borrow from the
/// reader's underlying buffer. Types that never borrow (all primitives,
/// owned containers) are generic over every `'de`; types that do borrow
/// (views, `&'de str`) fix it to their own lifetime parameter.
pub trait Serializable<'de>: Sized {
    /// Whether `T` may be bit-copied: its serialized form is its in-memory
    /// representation, so the receiver can reinterpret wire bytes in place
    /// rather than calling [`Serializable::deserialize`].
    const IS_TRIVIALLY_SERIALIZABLE: bool = false;

    /// Whether the deserialized form borrows bytes from the wire buffer
    /// rather than owning its own storage. If true, the value produced by
    /// [`Serializable::deserialize`] is only valid as long as `'de`.
    const REFERENCES_BUFFER: bool = false;

    /// Whether [`Serializable::skip`] can advance past an encoding without
    /// materializing the value (for instance, by reading a length prefix
    /// alone). False forces the RPC engine to fully deserialize even when it
    /// only needs to skip.
    const SKIP_IS_FAST: bool = true;

    /// A static or computed upper bound on the encoded size of `self`, used
    /// to decide whether a message fits the eager path. `None` means no
    /// bound is available without fully serializing.
    fn ubound(&self) -> Option<usize> {
        None
    }

    /// Writes the wire encoding of `self`.
    fn serialize<W: Writer>(&self, writer: &mut W);

    /// Reads a wire encoding, producing a value (placement-construction has
    /// no analogue in safe Rust; this simply returns by value).
    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error>;

    /// Advances `reader` past one encoding of `Self` without producing a value.
    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        Self::deserialize(reader).map(|_| ())
    }
}

/// Serializes `value` into a growable buffer and returns it.
pub fn to_bytes<'de, T: Serializable<'de>>(value: &T) -> Vec<u8> {
    let mut writer = match value.ubound() {
        Some(bound) => UnboundedWriter::with_capacity(bound),
        None => UnboundedWriter::new(),
    };
    value.serialize(&mut writer);
    writer.into_bytes()
}

/// Deserializes a `T` from the front of `bytes`.
pub fn from_bytes<'de, T: Serializable<'de>>(bytes: &'de [u8]) -> Result<T, Error> {
    let mut reader = Reader::new(bytes);
    T::deserialize(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_writer_panics_when_undercounted_would_overflow() {
        let mut buf = [0u8; 4];
        let mut writer = BoundedWriter::new(&mut buf);
        writer.write_bytes(&[1, 2, 3, 4]);
        assert_eq!(writer.written(), 4);
    }

    #[test]
    fn reader_reports_eof_past_the_end() {
        let bytes = [1u8, 2, 3];
        let mut reader = Reader::new(&bytes);
        assert!(reader.read_bytes(4).is_err());
    }

    #[test]
    fn roundtrip_u32_through_unbounded_writer() {
        let value: u32 = 0xdead_beef;
        let bytes = to_bytes(&value);
        let back: u32 = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }
}
