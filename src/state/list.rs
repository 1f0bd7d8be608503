//! List state stored as delimited lists with merge-based appends.

use super::namespaces::{self, NamespaceMergeStats};
use super::{KeyedState, StateContext, StateKind};
use crate::codec::{decode_list, encode_element, encode_list, ElementCodec, ListDecoder};
use crate::error::{Result, StateError};
use crate::keys::serialize_part;
use crate::store::{MergeStore, Partition};
use crate::transform::{ElementTransformer, ListSnapshotTransformer};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handle to list-valued state for one partition.
///
/// The partition must use [`crate::store::MergeOperator::StringAppend`] with
/// [`crate::codec::DELIMITER`]; appends then cost one `merge` and never read
/// the existing list.
pub struct ListState<K, N, C, S: ?Sized> {
    ctx: StateContext,
    store: Arc<S>,
    codec: Arc<C>,
    _marker: PhantomData<fn(&K, &N)>,
}

impl<K, N, C, S> ListState<K, N, C, S>
where
    K: Serialize,
    N: Serialize,
    C: ElementCodec,
    S: MergeStore + ?Sized,
{
    pub(crate) fn new(ctx: StateContext, store: Arc<S>, codec: Arc<C>) -> Self {
        Self {
            ctx,
            store,
            codec,
            _marker: PhantomData,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Decode the whole list. A missing key is an empty list.
    pub fn get(&self) -> Result<Vec<C::Item>> {
        let raw = self.get_raw()?;
        decode_list(&*self.codec, raw.as_deref())
    }

    /// The stored bytes with all pending appends resolved.
    pub fn get_raw(&self) -> Result<Option<Vec<u8>>> {
        let key = self.ctx.storage_key()?;
        self.store
            .get(self.ctx.partition(), &key)
            .map_err(|e| StateError::access("reading list state", e))
    }

    /// Visit elements one at a time without collecting them.
    pub fn for_each(&self, mut f: impl FnMut(C::Item) -> Result<()>) -> Result<()> {
        if let Some(raw) = self.get_raw()? {
            for item in ListDecoder::new(&*self.codec, &raw) {
                f(item?)?;
            }
        }
        Ok(())
    }

    /// Append one element.
    pub fn add(&self, item: &C::Item) -> Result<()> {
        let fragment = encode_element(&*self.codec, item)?;
        self.merge_fragment(&fragment)
    }

    /// Append several elements with a single merge. Empty input is a no-op.
    pub fn add_all(&self, items: &[C::Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let fragment = encode_list(&*self.codec, items)?;
        self.merge_fragment(&fragment)
    }

    /// Replace the list. An empty slice clears the key.
    ///
    /// Always a `put`: any appends the store has not resolved yet are
    /// discarded along with the old value.
    pub fn update(&self, items: &[C::Item]) -> Result<()> {
        if items.is_empty() {
            return self.clear_key();
        }
        let key = self.ctx.storage_key()?;
        let encoded = encode_list(&*self.codec, items)?;
        self.store
            .put(self.ctx.partition(), &key, &encoded)
            .map_err(|e| StateError::access("updating list state", e))
    }

    /// Append the lists of `sources` to the list of `target`, for the current
    /// key, deleting the sources. Sources without a value are skipped.
    ///
    /// The current namespace of the handle is left unchanged.
    pub fn merge_namespaces(&self, target: &N, sources: &[N]) -> Result<NamespaceMergeStats> {
        if sources.is_empty() {
            return Ok(NamespaceMergeStats::default());
        }
        let target_key = self.ctx.key_with_namespace(&serialize_part(target)?)?;
        let source_keys = sources
            .iter()
            .map(|ns| self.ctx.key_with_namespace(&serialize_part(ns)?))
            .collect::<Result<Vec<_>>>()?;
        namespaces::merge_namespaces(&*self.store, self.ctx.partition(), &target_key, &source_keys)
    }

    /// A copy of this handle that encodes with another codec.
    ///
    /// The original handle is untouched. Bytes already stored are not
    /// converted; see [`crate::migration`] for that.
    pub fn rebind<C2: ElementCodec>(&self, codec: C2) -> ListState<K, N, C2, S> {
        ListState {
            ctx: self.ctx.clone(),
            store: Arc::clone(&self.store),
            codec: Arc::new(codec),
            _marker: PhantomData,
        }
    }

    /// Compaction filter applying `transformer` to each element of every
    /// list in this partition.
    pub fn snapshot_transformer<F>(&self, transformer: F) -> ListSnapshotTransformer<C, F>
    where
        F: ElementTransformer<C::Item>,
    {
        ListSnapshotTransformer::new(Arc::clone(&self.codec), transformer)
    }

    fn merge_fragment(&self, fragment: &[u8]) -> Result<()> {
        let key = self.ctx.storage_key()?;
        self.store
            .merge(self.ctx.partition(), &key, fragment)
            .map_err(|e| StateError::access("appending to list state", e))
    }

    fn clear_key(&self) -> Result<()> {
        let key = self.ctx.storage_key()?;
        self.store
            .delete(self.ctx.partition(), &key)
            .map_err(|e| StateError::access("clearing list state", e))
    }
}

impl<K, N, C, S> KeyedState<K, N> for ListState<K, N, C, S>
where
    K: Serialize,
    N: Serialize,
    C: ElementCodec,
    S: MergeStore + ?Sized,
{
    fn kind(&self) -> StateKind {
        StateKind::List
    }

    fn partition(&self) -> &Partition {
        self.ctx.partition()
    }

    fn set_current_key(&mut self, key: &K) -> Result<()> {
        self.ctx.set_current_key(key)
    }

    fn set_current_namespace(&mut self, namespace: &N) -> Result<()> {
        self.ctx.set_current_namespace(namespace)
    }

    fn clear(&self) -> Result<()> {
        self.clear_key()
    }
}

impl<K, N, C: ElementCodec, S: ?Sized> fmt::Debug for ListState<K, N, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListState")
            .field("ctx", &self.ctx)
            .field("codec", &self.codec.descriptor())
            .finish()
    }
}
