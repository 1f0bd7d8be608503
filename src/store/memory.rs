//! In-memory store with deferred merge resolution.

use super::{CompactionFilter, CompactionStats, KvStore, MergeOperator, MergeStore, Partition};
use crate::error::{Result, StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// One key's stored state: a resolved base value plus merge operands that
/// have not been combined with it yet.
#[derive(Clone, Debug, Default)]
struct Entry {
    base: Option<Vec<u8>>,
    operands: Vec<Vec<u8>>,
    /// Bumped on every write; lets compaction detect concurrent writers.
    version: u64,
}

struct PartitionData {
    merge_operator: Option<MergeOperator>,
    entries: BTreeMap<Vec<u8>, Entry>,
}

impl PartitionData {
    fn resolve(&self, entry: &Entry) -> Option<Vec<u8>> {
        if entry.operands.is_empty() {
            return entry.base.clone();
        }
        // merge() refuses operands on partitions without an operator.
        let op = self.merge_operator?;
        Some(op.full_merge(entry.base.as_deref(), &entry.operands))
    }
}

/// Store holding everything in memory.
///
/// Merge operands are kept per key exactly as they arrive and only combined
/// when the key is read (without persisting the result) or compacted.
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, PartitionData>>,
    next_version: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Reject all further calls with [`StorageError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of unresolved merge operands held for a key.
    pub fn pending_operands(&self, partition: &Partition, key: &[u8]) -> usize {
        self.partitions
            .read()
            .get(partition.name())
            .and_then(|p| p.entries.get(key))
            .map_or(0, |e| e.operands.len())
    }

    /// Names of all partitions, sorted.
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn merge_operator(&self, partition: &Partition) -> Option<MergeOperator> {
        self.partitions
            .read()
            .get(partition.name())
            .and_then(|p| p.merge_operator)
    }

    /// Remove a partition and everything in it.
    pub fn drop_partition(&self, partition: &Partition) -> StorageResult<()> {
        self.check_open()?;
        self.partitions
            .write()
            .remove(partition.name())
            .map(|_| ())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn with_partition_mut<T>(
        &self,
        partition: &Partition,
        f: impl FnOnce(&mut PartitionData) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.check_open()?;
        let mut partitions = self.partitions.write();
        let data = partitions
            .get_mut(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        f(data)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn create_partition(
        &self,
        partition: &Partition,
        merge_operator: Option<MergeOperator>,
    ) -> StorageResult<()> {
        self.check_open()?;
        let mut partitions = self.partitions.write();
        if partitions.contains_key(partition.name()) {
            return Err(StorageError::PartitionExists(partition.name().to_string()));
        }
        partitions.insert(
            partition.name().to_string(),
            PartitionData {
                merge_operator,
                entries: BTreeMap::new(),
            },
        );
        debug!(partition = %partition, ?merge_operator, "created partition");
        Ok(())
    }

    fn has_partition(&self, partition: &Partition) -> bool {
        self.partitions.read().contains_key(partition.name())
    }

    fn get(&self, partition: &Partition, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        let partitions = self.partitions.read();
        let data = partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(data.entries.get(key).and_then(|e| data.resolve(e)))
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let version = self.bump();
        self.with_partition_mut(partition, |data| {
            data.entries.insert(
                key.to_vec(),
                Entry {
                    base: Some(value.to_vec()),
                    operands: Vec::new(),
                    version,
                },
            );
            Ok(())
        })
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> StorageResult<()> {
        self.with_partition_mut(partition, |data| {
            data.entries.remove(key);
            Ok(())
        })
    }

    fn scan(&self, partition: &Partition) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;
        let partitions = self.partitions.read();
        let data = partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(data
            .entries
            .iter()
            .filter_map(|(k, e)| data.resolve(e).map(|v| (k.clone(), v)))
            .collect())
    }
}

impl MergeStore for MemoryStore {
    fn merge(&self, partition: &Partition, key: &[u8], operand: &[u8]) -> StorageResult<()> {
        let version = self.bump();
        self.with_partition_mut(partition, |data| {
            if data.merge_operator.is_none() {
                return Err(StorageError::MergeNotSupported(partition.name().to_string()));
            }
            let entry = data.entries.entry(key.to_vec()).or_default();
            entry.operands.push(operand.to_vec());
            entry.version = version;
            trace!(partition = %partition, pending = entry.operands.len(), "queued merge operand");
            Ok(())
        })
    }

    /// Compact one partition.
    ///
    /// Values are captured under a read lock, filtered with no lock held,
    /// and written back only for keys nobody wrote in the meantime. Foreground
    /// writes are never blocked for the duration of the filter.
    fn compact(
        &self,
        partition: &Partition,
        filter: Option<&dyn CompactionFilter>,
    ) -> Result<CompactionStats> {
        self.check_open()?;

        let captured: Vec<(Vec<u8>, u64, usize, Option<Vec<u8>>)> = {
            let partitions = self.partitions.read();
            let data = partitions
                .get(partition.name())
                .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
            data.entries
                .iter()
                .map(|(k, e)| (k.clone(), e.version, e.operands.len(), data.resolve(e)))
                .collect()
        };

        let mut stats = CompactionStats {
            keys_scanned: captured.len(),
            ..Default::default()
        };

        // Any filter error aborts before a single key is touched.
        let mut decisions = Vec::with_capacity(captured.len());
        for (key, version, operands, value) in captured {
            let outcome = match filter {
                Some(f) => f.filter_or_transform(value.as_deref())?,
                None => value.clone(),
            };
            let changed = outcome != value;
            decisions.push((key, version, operands, outcome, changed));
        }

        self.check_open()?;
        let mut partitions = self.partitions.write();
        let data = partitions
            .get_mut(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;

        for (key, version, operands, outcome, changed) in decisions {
            let current = data.entries.get(&key).map(|e| e.version);
            if current != Some(version) {
                stats.keys_skipped += 1;
                continue;
            }
            match outcome {
                None => {
                    data.entries.remove(&key);
                    stats.keys_removed += 1;
                }
                Some(value) => {
                    if let Some(entry) = data.entries.get_mut(&key) {
                        entry.base = Some(value);
                        entry.operands.clear();
                    }
                    if changed {
                        stats.keys_rewritten += 1;
                    }
                }
            }
            stats.operands_folded += operands;
        }

        debug!(
            partition = %partition,
            filter = filter.map(|f| f.name()),
            ?stats,
            "compaction finished"
        );
        Ok(stats)
    }
}
