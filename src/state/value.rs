//! Single-value state.

use super::{KeyedState, StateContext, StateKind};
use crate::codec::{encode_element, ByteCursor, ElementCodec};
use crate::error::{Result, StateError};
use crate::store::{KvStore, Partition};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handle to one value per key and namespace, stored with a plain `put`.
pub struct ValueState<K, N, C, S: ?Sized> {
    ctx: StateContext,
    store: Arc<S>,
    codec: Arc<C>,
    _marker: PhantomData<fn(&K, &N)>,
}

impl<K, N, C, S> ValueState<K, N, C, S>
where
    K: Serialize,
    N: Serialize,
    C: ElementCodec,
    S: KvStore + ?Sized,
{
    pub(crate) fn new(ctx: StateContext, store: Arc<S>, codec: Arc<C>) -> Self {
        Self {
            ctx,
            store,
            codec,
            _marker: PhantomData,
        }
    }

    pub fn value(&self) -> Result<Option<C::Item>> {
        let key = self.ctx.storage_key()?;
        let raw = self
            .store
            .get(self.ctx.partition(), &key)
            .map_err(|e| StateError::access("reading value state", e))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut cursor = ByteCursor::new(&raw);
        let value = self.codec.decode(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(StateError::CorruptEncoding(format!(
                "{} trailing bytes after value",
                cursor.remaining()
            )));
        }
        Ok(Some(value))
    }

    pub fn update(&self, value: &C::Item) -> Result<()> {
        let key = self.ctx.storage_key()?;
        let encoded = encode_element(&*self.codec, value)?;
        self.store
            .put(self.ctx.partition(), &key, &encoded)
            .map_err(|e| StateError::access("updating value state", e))
    }
}

impl<K, N, C, S> KeyedState<K, N> for ValueState<K, N, C, S>
where
    K: Serialize,
    N: Serialize,
    C: ElementCodec,
    S: KvStore + ?Sized,
{
    fn kind(&self) -> StateKind {
        StateKind::Value
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
        let key = self.ctx.storage_key()?;
        self.store
            .delete(self.ctx.partition(), &key)
            .map_err(|e| StateError::access("clearing value state", e))
    }
}

impl<K, N, C: ElementCodec, S: ?Sized> fmt::Debug for ValueState<K, N, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueState")
            .field("ctx", &self.ctx)
            .field("codec", &self.codec.descriptor())
            .finish()
    }
}
