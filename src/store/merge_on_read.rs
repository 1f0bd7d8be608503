//! Merge emulation for stores without a native merge operator.

use super::{KvStore, MergeOperator, MergeStore, Partition};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Adds `merge` to any [`KvStore`] by reading the current value,
/// concatenating the operand and writing the result back.
///
/// Every merge costs a read plus a rewrite of the whole value, so appends
/// are O(list size) instead of O(1). Not safe with concurrent writers to
/// the same key.
pub struct MergeOnRead<S> {
    inner: S,
    operators: RwLock<HashMap<String, MergeOperator>>,
}

impl<S: KvStore> MergeOnRead<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            operators: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: KvStore> KvStore for MergeOnRead<S> {
    fn create_partition(
        &self,
        partition: &Partition,
        merge_operator: Option<MergeOperator>,
    ) -> StorageResult<()> {
        self.inner.create_partition(partition, None)?;
        if let Some(op) = merge_operator {
            self.operators.write().insert(partition.name().to_string(), op);
        }
        Ok(())
    }

    fn has_partition(&self, partition: &Partition) -> bool {
        self.inner.has_partition(partition)
    }

    fn get(&self, partition: &Partition, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(partition, key)
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.inner.put(partition, key, value)
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> StorageResult<()> {
        self.inner.delete(partition, key)
    }

    fn scan(&self, partition: &Partition) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(partition)
    }
}

impl<S: KvStore> MergeStore for MergeOnRead<S> {
    fn merge(&self, partition: &Partition, key: &[u8], operand: &[u8]) -> StorageResult<()> {
        let op = self
            .operators
            .read()
            .get(partition.name())
            .copied()
            .ok_or_else(|| StorageError::MergeNotSupported(partition.name().to_string()))?;
        let existing = self.inner.get(partition, key)?;
        let merged = op.full_merge(existing.as_deref(), &[operand.to_vec()]);
        self.inner.put(partition, key, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_merge_writes_resolved_value() {
        let p = Partition::new("list");
        let store = MergeOnRead::new(MemoryStore::new());
        store
            .create_partition(&p, Some(MergeOperator::string_append(b',')))
            .unwrap();

        store.merge(&p, b"k", b"a").unwrap();
        store.merge(&p, b"k", b"b").unwrap();

        assert_eq!(store.get(&p, b"k").unwrap(), Some(b"a,b".to_vec()));
        // Nothing is left pending in the wrapped store.
        assert_eq!(store.inner().pending_operands(&p, b"k"), 0);
    }

    #[test]
    fn test_merge_without_operator() {
        let p = Partition::new("plain");
        let store = MergeOnRead::new(MemoryStore::new());
        store.create_partition(&p, None).unwrap();
        assert!(matches!(
            store.merge(&p, b"k", b"a"),
            Err(StorageError::MergeNotSupported(_))
        ));
    }

    #[test]
    fn test_default_compaction() {
        let p = Partition::new("list");
        let store = MergeOnRead::new(MemoryStore::new());
        store
            .create_partition(&p, Some(MergeOperator::string_append(b',')))
            .unwrap();
        store.merge(&p, b"k", b"a").unwrap();

        let stats = store.compact(&p, None).unwrap();
        assert_eq!(stats.keys_scanned, 1);
        assert_eq!(stats.keys_rewritten, 0);
    }
}
