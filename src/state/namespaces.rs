//! Consolidating several namespaces' lists into one.

use crate::error::{Result, StateError};
use crate::store::{MergeStore, Partition};
use tracing::debug;

/// What a namespace merge did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceMergeStats {
    /// Sources whose bytes were moved into the target.
    pub moved: usize,
    /// Sources with no stored value.
    pub skipped: usize,
    /// Total bytes appended to the target.
    pub bytes: usize,
}

/// Move each source's encoded list onto the end of the target's.
///
/// Sources are visited in the given order, so the target ends up holding its
/// previous content followed by each source's elements in turn. The encoded
/// bytes are moved as-is: a source is read, deleted, and its bytes merged
/// into the target key, without decoding.
///
/// There is no rollback. If a store call fails, sources already moved stay
/// deleted and merged, and the error is returned immediately.
pub(crate) fn merge_namespaces<S: MergeStore + ?Sized>(
    store: &S,
    partition: &Partition,
    target_key: &[u8],
    source_keys: &[Vec<u8>],
) -> Result<NamespaceMergeStats> {
    let mut stats = NamespaceMergeStats::default();
    let fail = |e| StateError::access("merging namespaces", e);

    for source_key in source_keys {
        match store.get(partition, source_key).map_err(fail)? {
            Some(bytes) if !bytes.is_empty() => {
                store.delete(partition, source_key).map_err(fail)?;
                store.merge(partition, target_key, &bytes).map_err(fail)?;
                stats.moved += 1;
                stats.bytes += bytes.len();
            }
            _ => stats.skipped += 1,
        }
    }

    debug!(
        partition = %partition,
        moved = stats.moved,
        skipped = stats.skipped,
        bytes = stats.bytes,
        "merged namespaces"
    );
    Ok(stats)
}
