//! Storage key construction from (key group, key, namespace).

use crate::error::{Result, StateError};
use serde::Serialize;

/// Key groups are the unit in which keyed state is partitioned across workers.
pub type KeyGroup = u16;

/// Compute the key group of serialized key bytes.
pub fn key_group_for(key: &[u8], max_parallelism: u16) -> KeyGroup {
    debug_assert!(max_parallelism > 0);
    (crc32fast::hash(key) % u32::from(max_parallelism.max(1))) as KeyGroup
}

/// Serialize a user key or namespace into the bytes used inside storage keys.
pub fn serialize_part<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| StateError::Serialization(e.to_string()))
}

/// Builds the store key for one (key group, key, namespace) triple.
///
/// Implementations must be injective: distinct triples map to distinct keys.
pub trait KeyBuilder: Send + Sync {
    fn build_key(&self, key_group: KeyGroup, key: &[u8], namespace: &[u8]) -> Vec<u8>;
}

/// Default layout: key-group prefix, `u32` key length, key, namespace.
///
/// The prefix is one byte when at most 128 key groups exist, two otherwise,
/// always big-endian so keys sort by key group first.
#[derive(Clone, Copy, Debug)]
pub struct CompositeKeyBuilder {
    prefix_bytes: usize,
}

impl CompositeKeyBuilder {
    pub fn new(max_parallelism: u16) -> Self {
        Self {
            prefix_bytes: if max_parallelism <= 128 { 1 } else { 2 },
        }
    }

    pub fn prefix_bytes(&self) -> usize {
        self.prefix_bytes
    }
}

impl KeyBuilder for CompositeKeyBuilder {
    fn build_key(&self, key_group: KeyGroup, key: &[u8], namespace: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix_bytes + 4 + key.len() + namespace.len());
        let group = key_group.to_be_bytes();
        out.extend_from_slice(&group[2 - self.prefix_bytes..]);
        out.extend_from_slice(&(key.len() as u32).to_be_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(namespace);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_width() {
        assert_eq!(CompositeKeyBuilder::new(128).prefix_bytes(), 1);
        assert_eq!(CompositeKeyBuilder::new(129).prefix_bytes(), 2);

        let key = CompositeKeyBuilder::new(1024).build_key(0x0102, b"k", b"n");
        assert_eq!(&key[..2], &[0x01, 0x02]);
        assert_eq!(&key[2..6], &1u32.to_be_bytes());
        assert_eq!(&key[6..], b"kn");
    }

    #[test]
    fn test_key_namespace_boundary_is_unambiguous() {
        let builder = CompositeKeyBuilder::new(128);
        let a = builder.build_key(0, b"ab", b"c");
        let b = builder.build_key(0, b"a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_group_in_range() {
        for i in 0..1000u32 {
            let key = serialize_part(&i).unwrap();
            assert!(key_group_for(&key, 7) < 7);
        }
    }

    #[test]
    fn test_key_group_is_stable() {
        let key = serialize_part("user-42").unwrap();
        assert_eq!(key_group_for(&key, 128), key_group_for(&key, 128));
    }
}
