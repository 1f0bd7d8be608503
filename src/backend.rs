//! Keyed state backend: registry of named states over one store.

use crate::codec::{CodecDescriptor, ElementCodec, DELIMITER};
use crate::compaction::{CompactionJob, CompactionWorker};
use crate::config::BackendConfig;
use crate::error::{Result, StateError};
use crate::keys::{CompositeKeyBuilder, KeyBuilder};
use crate::migration::{migrate_list, ElementMigration};
use crate::state::{ListState, StateContext, StateKind, ValueState};
use crate::store::{CompactionFilter, CompactionStats, MergeOperator, MergeStore, Partition};
use crate::transform::{ElementTransformer, ListSnapshotTransformer};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What the backend remembers about a registered state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetaInfo {
    pub name: String,
    pub kind: StateKind,
    pub codec: CodecDescriptor,
}

/// Format version of [`KeyedStateBackend::meta_snapshot`].
const META_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MetaSnapshot {
    version: u32,
    states: Vec<StateMetaInfo>,
}

/// Hands out state handles and keeps their metadata.
///
/// Each state lives in its own partition named after the state. List state
/// partitions use the append merge operator with [`DELIMITER`].
pub struct KeyedStateBackend<S: ?Sized> {
    store: Arc<S>,
    key_builder: Arc<dyn KeyBuilder>,
    config: BackendConfig,
    registry: RwLock<BTreeMap<String, StateMetaInfo>>,
}

impl<S> KeyedStateBackend<S>
where
    S: MergeStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: BackendConfig) -> Result<Self> {
        let key_builder = Arc::new(CompositeKeyBuilder::new(config.max_parallelism));
        Self::with_key_builder(store, config, key_builder)
    }

    pub fn with_key_builder(
        store: Arc<S>,
        config: BackendConfig,
        key_builder: Arc<dyn KeyBuilder>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            key_builder,
            config,
            registry: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Register (or reopen) a list state.
    ///
    /// Reopening with the same codec returns a fresh handle. A different
    /// codec name or version is rejected until [`Self::upgrade_list_state`]
    /// has converted the stored lists.
    pub fn register_list_state<K, N, C>(&self, name: &str, codec: C) -> Result<ListState<K, N, C, S>>
    where
        K: Serialize,
        N: Serialize,
        C: ElementCodec,
    {
        let partition = self.register(name, StateKind::List, codec.descriptor())?;
        Ok(ListState::new(self.context(partition), Arc::clone(&self.store), Arc::new(codec)))
    }

    pub fn register_value_state<K, N, C>(
        &self,
        name: &str,
        codec: C,
    ) -> Result<ValueState<K, N, C, S>>
    where
        K: Serialize,
        N: Serialize,
        C: ElementCodec,
    {
        let partition = self.register(name, StateKind::Value, codec.descriptor())?;
        Ok(ValueState::new(self.context(partition), Arc::clone(&self.store), Arc::new(codec)))
    }

    /// Re-encode every stored list of `name` from `prior` to `new`.
    ///
    /// All lists are migrated in memory first; nothing is written unless
    /// every one succeeds. Returns the number of keys rewritten. Writers to
    /// the state must be paused for the duration.
    pub fn upgrade_list_state<P, N, M>(
        &self,
        name: &str,
        prior: &P,
        new: &N,
        migration: &M,
    ) -> Result<usize>
    where
        P: ElementCodec,
        N: ElementCodec,
        M: ElementMigration<P::Item, N::Item> + ?Sized,
    {
        let meta = self.meta(name)?;
        expect_kind(&meta, StateKind::List)?;
        if meta.codec != prior.descriptor() {
            return Err(StateError::IncompatibleSchema {
                name: name.to_string(),
                registered: meta.codec.to_string(),
                requested: prior.descriptor().to_string(),
            });
        }

        let partition = Partition::new(name);
        let entries = self
            .store
            .scan(&partition)
            .map_err(|e| StateError::access("scanning state for migration", e))?;

        let mut migrated = Vec::with_capacity(entries.len());
        let mut elements = 0;
        for (key, value) in entries {
            let mut out = Vec::with_capacity(value.len());
            elements += migrate_list(&value, prior, new, migration, &mut out)?;
            migrated.push((key, out));
        }

        for (key, value) in &migrated {
            self.store
                .put(&partition, key, value)
                .map_err(|e| StateError::access("writing migrated state", e))?;
        }

        self.registry.write().insert(
            name.to_string(),
            StateMetaInfo {
                name: name.to_string(),
                kind: StateKind::List,
                codec: new.descriptor(),
            },
        );

        info!(
            state = name,
            keys = migrated.len(),
            elements,
            from = %prior.descriptor(),
            to = %new.descriptor(),
            "upgraded list state"
        );
        Ok(migrated.len())
    }

    /// Compaction filter for a registered list state.
    pub fn list_transformer<C, F>(
        &self,
        name: &str,
        codec: C,
        transformer: F,
    ) -> Result<ListSnapshotTransformer<C, F>>
    where
        C: ElementCodec,
        F: ElementTransformer<C::Item>,
    {
        let meta = self.meta(name)?;
        expect_kind(&meta, StateKind::List)?;
        expect_codec(&meta, &codec.descriptor())?;
        Ok(ListSnapshotTransformer::new(Arc::new(codec), transformer))
    }

    /// Run one compaction pass over a state's partition on this thread.
    pub fn compact(
        &self,
        name: &str,
        filter: Option<&dyn CompactionFilter>,
    ) -> Result<CompactionStats> {
        self.meta(name)?;
        self.store.compact(&Partition::new(name), filter)
    }

    /// Job for [`CompactionWorker::submit`] targeting a registered state.
    pub fn compaction_job(
        &self,
        name: &str,
        filter: Option<Arc<dyn CompactionFilter>>,
    ) -> Result<CompactionJob> {
        self.meta(name)?;
        Ok(CompactionJob {
            partition: Partition::new(name),
            filter,
        })
    }

    pub fn spawn_compaction_worker(&self) -> Result<CompactionWorker>
    where
        S: 'static,
    {
        CompactionWorker::spawn(Arc::clone(&self.store), self.config.compaction_queue_capacity)
    }

    /// Registered states in name order.
    pub fn states(&self) -> Vec<StateMetaInfo> {
        self.registry.read().values().cloned().collect()
    }

    pub fn meta(&self, name: &str) -> Result<StateMetaInfo> {
        self.registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::StateNotRegistered(name.to_string()))
    }

    /// Serialize the registry as JSON.
    pub fn meta_snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = MetaSnapshot {
            version: META_VERSION,
            states: self.states(),
        };
        Ok(serde_json::to_vec_pretty(&snapshot)?)
    }

    /// Replace the registry from [`Self::meta_snapshot`] output, creating any
    /// partition the store does not have yet.
    pub fn restore_meta(&self, bytes: &[u8]) -> Result<()> {
        let snapshot: MetaSnapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != META_VERSION {
            return Err(StateError::InvalidArgument(format!(
                "unsupported meta snapshot version {}",
                snapshot.version
            )));
        }

        for meta in &snapshot.states {
            self.ensure_partition(&Partition::new(&meta.name), meta.kind)?;
        }

        let mut registry = self.registry.write();
        registry.clear();
        for meta in snapshot.states {
            registry.insert(meta.name.clone(), meta);
        }
        info!(states = registry.len(), "restored state metadata");
        Ok(())
    }

    fn register(&self, name: &str, kind: StateKind, codec: CodecDescriptor) -> Result<Partition> {
        if name.is_empty() {
            return Err(StateError::InvalidArgument("state name must not be empty".into()));
        }
        let partition = Partition::new(name);

        let mut registry = self.registry.write();
        if let Some(existing) = registry.get(name) {
            expect_kind(existing, kind)?;
            expect_codec(existing, &codec)?;
            debug!(state = name, %kind, "reopened state");
            return Ok(partition);
        }

        self.ensure_partition(&partition, kind)?;
        info!(state = name, %kind, codec = %codec, "registered state");
        registry.insert(
            name.to_string(),
            StateMetaInfo {
                name: name.to_string(),
                kind,
                codec,
            },
        );
        Ok(partition)
    }

    fn ensure_partition(&self, partition: &Partition, kind: StateKind) -> Result<()> {
        if self.store.has_partition(partition) {
            return Ok(());
        }
        let merge_operator = match kind {
            StateKind::List => Some(MergeOperator::string_append(DELIMITER)),
            _ => None,
        };
        self.store
            .create_partition(partition, merge_operator)
            .map_err(|e| StateError::access("creating state partition", e))
    }

    fn context(&self, partition: Partition) -> StateContext {
        StateContext::new(
            partition,
            Arc::clone(&self.key_builder),
            self.config.max_parallelism,
        )
    }
}

fn expect_kind(meta: &StateMetaInfo, kind: StateKind) -> Result<()> {
    if meta.kind != kind {
        return Err(StateError::KindMismatch {
            expected: meta.kind.to_string(),
            got: kind.to_string(),
        });
    }
    Ok(())
}

fn expect_codec(meta: &StateMetaInfo, codec: &CodecDescriptor) -> Result<()> {
    if &meta.codec != codec {
        return Err(StateError::IncompatibleSchema {
            name: meta.name.clone(),
            registered: meta.codec.to_string(),
            requested: codec.to_string(),
        });
    }
    Ok(())
}
