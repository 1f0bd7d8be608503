//! Keyed state handles.
//!
//! Every state variant addresses the store the same way: a partition, the
//! current key (hashed into a key group) and the current namespace are
//! turned into one storage key by a [`KeyBuilder`]. That addressing lives
//! in [`StateContext`]; the variants compose it rather than inherit it.

mod list;
mod namespaces;
mod value;

pub use list::ListState;
pub use namespaces::NamespaceMergeStats;
pub use value::ValueState;

use crate::error::{Result, StateError};
use crate::keys::{key_group_for, serialize_part, KeyBuilder, KeyGroup};
use crate::store::Partition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The closed set of keyed state variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    List,
    Map,
    Value,
    Aggregating,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::List => "list",
            StateKind::Map => "map",
            StateKind::Value => "value",
            StateKind::Aggregating => "aggregating",
        };
        write!(f, "{}", name)
    }
}

/// Capabilities shared by every keyed state handle.
pub trait KeyedState<K, N> {
    fn kind(&self) -> StateKind;

    fn partition(&self) -> &Partition;

    fn set_current_key(&mut self, key: &K) -> Result<()>;

    /// Point the handle at another namespace. Only the storage key used by
    /// later calls changes; the handle itself stays the same.
    fn set_current_namespace(&mut self, namespace: &N) -> Result<()>;

    /// Remove the value under the current key and namespace.
    fn clear(&self) -> Result<()>;
}

#[derive(Clone, Debug)]
struct CurrentKey {
    group: KeyGroup,
    bytes: Vec<u8>,
}

/// Storage addressing shared by all state variants.
#[derive(Clone)]
pub(crate) struct StateContext {
    partition: Partition,
    key_builder: Arc<dyn KeyBuilder>,
    max_parallelism: u16,
    current_key: Option<CurrentKey>,
    /// Serialized namespace. Empty until set: the default namespace.
    namespace: Vec<u8>,
}

impl StateContext {
    pub(crate) fn new(
        partition: Partition,
        key_builder: Arc<dyn KeyBuilder>,
        max_parallelism: u16,
    ) -> Self {
        Self {
            partition,
            key_builder,
            max_parallelism,
            current_key: None,
            namespace: Vec::new(),
        }
    }

    pub(crate) fn partition(&self) -> &Partition {
        &self.partition
    }

    pub(crate) fn set_current_key<K: Serialize + ?Sized>(&mut self, key: &K) -> Result<()> {
        let bytes = serialize_part(key)?;
        let group = key_group_for(&bytes, self.max_parallelism);
        self.current_key = Some(CurrentKey { group, bytes });
        Ok(())
    }

    pub(crate) fn current_key_group(&self) -> Option<KeyGroup> {
        self.current_key.as_ref().map(|k| k.group)
    }

    pub(crate) fn set_current_namespace<N: Serialize + ?Sized>(&mut self, namespace: &N) -> Result<()> {
        self.namespace = serialize_part(namespace)?;
        Ok(())
    }

    /// Storage key for the current key and namespace.
    pub(crate) fn storage_key(&self) -> Result<Vec<u8>> {
        self.key_with_namespace(&self.namespace)
    }

    /// Storage key for the current key under another serialized namespace.
    pub(crate) fn key_with_namespace(&self, namespace: &[u8]) -> Result<Vec<u8>> {
        let key = self.current_key.as_ref().ok_or(StateError::KeyNotSet)?;
        Ok(self.key_builder.build_key(key.group, &key.bytes, namespace))
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("partition", &self.partition)
            .field("key_group", &self.current_key_group())
            .field("namespace_len", &self.namespace.len())
            .finish()
    }
}
