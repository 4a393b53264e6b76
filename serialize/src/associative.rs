//! Associative containers (§4.5 "Containers"): maps and sets, encoded the
//! same length-prefixed-elements shape as [`Vec<T>`](crate::sequence), just
//! with pair or single-key elements instead of a flat sequence.
//!
//! None of these are trivially serializable or skip-fast even when their
//! key/value types are, since the hash table's iteration order isn't the
//! wire order a receiver could reconstruct without walking every element —
//! unlike [`crate::sequence::deserialize_trivial_view`]'s flat, order-
//! preserving layout, there's no in-place view to offer here.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use crate::{Error, Reader, Serializable, Writer};

impl<'de, K, V> Serializable<'de> for HashMap<K, V>
where
    K: Serializable<'de> + Eq + Hash,
    V: Serializable<'de>,
{
    const SKIP_IS_FAST: bool = false;

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        for (k, v) in self {
            k.serialize(writer);
            v.serialize(writer);
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let mut out = HashMap::with_capacity(len);
        for _ in 0..len {
            let key = K::deserialize(reader)?;
            let value = V::deserialize(reader)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        let len = reader.read_len()?;
        for _ in 0..len {
            K::skip(reader)?;
            V::skip(reader)?;
        }
        Ok(())
    }
}

impl<'de, T> Serializable<'de> for HashSet<T>
where
    T: Serializable<'de> + Eq + Hash,
{
    const SKIP_IS_FAST: bool = false;

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        for item in self {
            item.serialize(writer);
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let mut out = HashSet::with_capacity(len);
        for _ in 0..len {
            out.insert(T::deserialize(reader)?);
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

impl<'de, K, V> Serializable<'de> for BTreeMap<K, V>
where
    K: Serializable<'de> + Ord,
    V: Serializable<'de>,
{
    const SKIP_IS_FAST: bool = false;

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        for (k, v) in self {
            k.serialize(writer);
            v.serialize(writer);
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let mut out = BTreeMap::new();
        for _ in 0..len {
            let key = K::deserialize(reader)?;
            let value = V::deserialize(reader)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn skip(reader: &mut Reader<'de>) -> Result<(), Error> {
        let len = reader.read_len()?;
        for _ in 0..len {
            K::skip(reader)?;
            V::skip(reader)?;
        }
        Ok(())
    }
}

impl<'de, T> Serializable<'de> for BTreeSet<T>
where
    T: Serializable<'de> + Ord,
{
    const SKIP_IS_FAST: bool = false;

    fn serialize<W: Writer>(&self, writer: &mut W) {
        writer.write_len(self.len());
        for item in self {
            item.serialize(writer);
        }
    }

    fn deserialize(reader: &mut Reader<'de>) -> Result<Self, Error> {
        let len = reader.read_len()?;
        let mut out = BTreeSet::new();
        for _ in 0..len {
            out.insert(T::deserialize(reader)?);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_bytes, to_bytes};

    #[test]
    fn hash_map_of_string_to_u32_roundtrips() {
        let mut value = HashMap::new();
        value.insert("a".to_string(), 1u32);
        value.insert("bb".to_string(), 22u32);
        value.insert("ccc".to_string(), 333u32);
        let bytes = to_bytes(&value);
        let back: HashMap<String, u32> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn hash_set_of_u64_roundtrips() {
        let value: HashSet<u64> = [1, 2, 3, 100, 9999].into_iter().collect();
        let bytes = to_bytes(&value);
        let back: HashSet<u64> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn btree_map_preserves_key_order_on_the_wire() {
        let mut value = BTreeMap::new();
        value.insert(3u32, "three".to_string());
        value.insert(1u32, "one".to_string());
        value.insert(2u32, "two".to_string());
        let bytes = to_bytes(&value);
        let back: BTreeMap<u32, String> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
        assert_eq!(back.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn btree_set_of_i64_roundtrips() {
        let value: BTreeSet<i64> = [-5, 0, 5, 10].into_iter().collect();
        let bytes = to_bytes(&value);
        let back: BTreeSet<i64> = from_bytes(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn empty_map_and_set_roundtrip() {
        let map: HashMap<u32, u32> = HashMap::new();
        let bytes = to_bytes(&map);
        let back: HashMap<u32, u32> = from_bytes(&bytes).unwrap();
        assert!(back.is_empty());

        let set: BTreeSet<u32> = BTreeSet::new();
        let bytes = to_bytes(&set);
        let back: BTreeSet<u32> = from_bytes(&bytes).unwrap();
        assert!(back.is_empty());
    }
}
