//! Embedded key/value store contract.
//!
//! List state needs four primitives from its store: `get`, `put`, `delete`
//! and an associative `merge` whose operands the store may keep unresolved
//! until a read or a compaction. The only merge operator list state relies
//! on is order-preserving concatenation with a one-byte delimiter
//! ([`MergeOperator::StringAppend`]).
//!
//! ## Partition Model
//!
//! A [`Partition`] is what a column-family engine calls a column family: a
//! separately configured key space. Each partition carries its own merge
//! operator.

mod log;
mod memory;
mod merge_on_read;

pub use self::log::LogStore;
pub use memory::MemoryStore;
pub use merge_on_read::MergeOnRead;

use crate::error::{Result, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A named key space inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    name: String,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a store combines merge operands for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOperator {
    /// Concatenate operands in arrival order, one delimiter byte between
    /// consecutive pieces.
    StringAppend { delimiter: u8 },
}

impl MergeOperator {
    pub fn string_append(delimiter: u8) -> Self {
        MergeOperator::StringAppend { delimiter }
    }

    /// Combine an existing value with pending operands.
    ///
    /// Associative: merging operands in batches gives the same bytes as
    /// merging them one at a time.
    pub fn full_merge(&self, existing: Option<&[u8]>, operands: &[Vec<u8>]) -> Vec<u8> {
        match self {
            MergeOperator::StringAppend { delimiter } => {
                let size = existing.map_or(0, |e| e.len() + 1)
                    + operands.iter().map(|o| o.len() + 1).sum::<usize>();
                let mut out = Vec::with_capacity(size);
                let mut first = true;
                if let Some(existing) = existing {
                    out.extend_from_slice(existing);
                    first = false;
                }
                for operand in operands {
                    if !first {
                        out.push(*delimiter);
                    }
                    out.extend_from_slice(operand);
                    first = false;
                }
                out
            }
        }
    }
}

/// Counters reported by a compaction pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Keys visited.
    pub keys_scanned: usize,
    /// Keys whose value the filter changed.
    pub keys_rewritten: usize,
    /// Keys the filter removed.
    pub keys_removed: usize,
    /// Unresolved merge operands folded into base values.
    pub operands_folded: usize,
    /// Keys written concurrently with the pass and therefore left alone.
    pub keys_skipped: usize,
}

/// Per-value hook run by a store's compaction.
///
/// `None` in means the key holds a tombstone; `None` out removes the key.
/// An error aborts the pass without changing any key.
pub trait CompactionFilter: Send + Sync {
    fn name(&self) -> &str;

    fn filter_or_transform(&self, value: Option<&[u8]>) -> Result<Option<Vec<u8>>>;
}

/// Basic ordered key/value access.
pub trait KvStore: Send + Sync {
    /// Create a partition. Creating an existing partition is an error.
    fn create_partition(
        &self,
        partition: &Partition,
        merge_operator: Option<MergeOperator>,
    ) -> StorageResult<()>;

    fn has_partition(&self, partition: &Partition) -> bool;

    fn get(&self, partition: &Partition, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn delete(&self, partition: &Partition, key: &[u8]) -> StorageResult<()>;

    /// All live keys of a partition in key order, values fully resolved.
    fn scan(&self, partition: &Partition) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// A store with a merge primitive.
pub trait MergeStore: KvStore {
    /// Queue `operand` for combination with the key's value using the
    /// partition's merge operator. Must not read the existing value.
    fn merge(&self, partition: &Partition, key: &[u8], operand: &[u8]) -> StorageResult<()>;

    /// Resolve pending operands and run `filter` over every value.
    ///
    /// The default visits keys through `scan`/`put`/`delete` and is only
    /// correct when no other writer touches the partition meanwhile.
    fn compact(
        &self,
        partition: &Partition,
        filter: Option<&dyn CompactionFilter>,
    ) -> Result<CompactionStats> {
        let entries = self.scan(partition)?;
        let mut stats = CompactionStats {
            keys_scanned: entries.len(),
            ..Default::default()
        };

        let mut decisions = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let outcome = match filter {
                Some(f) => f.filter_or_transform(Some(&value))?,
                None => Some(value.clone()),
            };
            decisions.push((key, value, outcome));
        }

        for (key, before, after) in decisions {
            match after {
                None => {
                    self.delete(partition, &key)?;
                    stats.keys_removed += 1;
                }
                Some(after) if after != before => {
                    self.put(partition, &key, &after)?;
                    stats.keys_rewritten += 1;
                }
                Some(_) => {}
            }
        }

        debug!(partition = %partition, ?stats, "compaction finished");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_append_without_existing() {
        let op = MergeOperator::string_append(b',');
        let merged = op.full_merge(None, &[b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(merged, b"a,b");
    }

    #[test]
    fn test_string_append_with_existing() {
        let op = MergeOperator::string_append(b',');
        let merged = op.full_merge(Some(b"x"), &[b"y".to_vec()]);
        assert_eq!(merged, b"x,y");
    }

    #[test]
    fn test_string_append_is_associative() {
        let op = MergeOperator::string_append(b'|');
        let operands = vec![b"1".to_vec(), b"22".to_vec(), b"333".to_vec()];

        let all_at_once = op.full_merge(Some(b"0"), &operands);
        let partial = op.full_merge(Some(b"0"), &operands[..1]);
        let stepwise = op.full_merge(Some(&partial), &operands[1..]);
        assert_eq!(all_at_once, stepwise);
        assert_eq!(all_at_once, b"0|1|22|333");
    }
}
