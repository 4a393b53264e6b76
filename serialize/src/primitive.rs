//! Trivially-serializable scalars and the handful of std types (`String`,
//! `&str`, `Option<T>`) the RPC layer needs that aren't sequence containers.

use crate::{Error, Reader, Serializable, Writer};

macro_rules! impl_trivial {
    ($($t:ty),* $(,)?) => {
        $(
            impl<'de> Serializable<'de> for $t {
                const IS_TRIVIALLY_SERIALIZABLE: bool = true;
                const REFERENCES_BUFFER: bool = false;
                const SKIP_IS_FAST: bool = true;

                fn ubound(&self) -> Option<usize> {
                    Some(std::mem::size_of::<$t>())
                }

                fn serialize<W: Writer>(&self, writer: &mut W) {
                    writer.write_bytes(&self.to_le_bytes());
                }

                fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
                    let bytes = reader.read_bytes(std::mem::size_of::<$t>())?;
                    Ok(<$t>::from_le_bytes(bytes.try_into().expect("size checked by read_bytes")))
                }

                fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
                    reader.skip_bytes(std::mem::size_of::<$t>())
                }
            }
        )*
    };
}

impl_trivial!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl<'de> Serializable<'de> for bool {
    const IS_TRIVIALLY_SERIALIZABLE: bool = true;
    const REFERENCES_BUFFER: bool = false;
    const SKIP_IS_FAST: bool = true;

    fn ubound(&self) -> Option<usize> {
        Some(1)
    }

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_bytes(&[*self as u8]);
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        Ok(reader.read_bytes(1)?[0] != 0)
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        reader.skip_bytes(1)
    }
}

impl<'de> Serializable<'de> for () {
    const IS_TRIVIALLY_SERIALIZABLE: bool = true;
    const SKIP_IS_FAST: bool = true;

    fn ubound(&self) -> Option<usize> {
        Some(0)
    }

    fn serialize<W: Writer>(&self, _writer: &mut W) {}

    fn deserialize(_reader: &mut Reader<'de>) -> Result<Self, Error> {
        Ok(())
    }

    fn skip(_reader: &mut Reader<'de>) -> Result<(), Error> {
        Ok(())
    }
}

/// Owned, UTF-8 text: length-prefixed bytes, copied out on deserialize.
impl<'de> Serializable<'de> for String {
    const IS_TRIVIALLY_SERIALIZABLE: bool = false;
    const REFERENCES_BUFFER: bool = false;
    const SKIP_IS_FAST: bool = true;

    fn ubound(&self) -> Option<usize> {
        Some(8 + self.len())
    }

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        writer.write_bytes(self.as_bytes());
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let bytes = reader.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        let len = reader.read_len()?;
        reader.skip_bytes(len)
    }
}

/// Borrowed UTF-8 text, reified directly from the wire buffer; the
/// zero-copy counterpart to [`String`]'s owned path.
impl<'de> Serializable<'de> for &'de str {
    const IS_TRIVIALLY_SERIALIZABLE: bool = false;
    const REFERENCES_BUFFER: bool = true;
    const SKIP_IS_FAST: bool = true;

    fn ubound(&self) -> Option<usize> {
        Some(8 + self.len())
    }

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        writer.write_bytes(self.as_bytes());
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let bytes = reader.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::Eof { wanted: len, available: bytes.len() })
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        let len = reader.read_len()?;
        reader.skip_bytes(len)
    }
}

impl<'de, T: Serializable<'de>> Serializable<'de> for Option<T> {
    const IS_TRIVIALLY_SERIALIZABLE: bool = false;
    const REFERENCES_BUFFER: bool = T::REFERENCES_BUFFER;
    const SKIP_IS_FAST: bool = T::SKIP_IS_FAST;

    fn ubound(&self) -> Option<usize> {
        match self {
            Some(value) => value.ubound().map(|b| b + 1),
            None => Some(1),
        }
    }

    fn serialize<W: Writer>(&self, writer: &mut W) {
        match self {
            Some(value) => {
                writer.write_bytes(&[1]);
                value.serialize(writer);
            }
            None => writer.write_bytes(&[0]),
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        match reader.read_bytes(1)?[0] {
            0 => Ok(None),
            _ => Ok(Some(T::deserialize(reader)?)),
        }
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        match reader.read_bytes(1)?[0] {
            0 => Ok(()),
            _ => T::skip(reader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_bytes, to_bytes};

    #[test]
    fn f64_roundtrips() {
        let value = std::f64::consts::PI;
        let bytes = to_bytes(&value);
        let back: f64 = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn string_roundtrips_owned() {
        let value = String::from("hello, pgas");
        let bytes = to_bytes(&value);
        let back: String = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn str_borrows_from_the_wire_buffer() {
        let value = "zero-copy";
        let bytes = to_bytes(&value);
        let back: &str = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn option_none_roundtrips() {
        let value: Option<u32> = None;
        let bytes = to_bytes(&value);
        let back: Option<u32> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn option_some_roundtrips() {
        let value: Option<u32> = Some(42);
        let bytes = to_bytes(&value);
        let back: Option<u32> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }
}
