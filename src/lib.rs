//! # Keyed List State
//!
//! List-valued keyed state on top of an embedded key/value store with an
//! append merge operator.
//!
//! ## Core Concepts
//!
//! - **Lists**: Elements encoded back to back, one `,` delimiter between
//!   them. An empty list is an absent key.
//! - **Appends**: One `merge` per `add`, never a read-modify-write
//! - **Namespaces**: Sub-keys under each key; lists of several namespaces can
//!   be merged into one by moving raw bytes
//! - **Compaction**: Per-element filtering of stored lists, either rewriting
//!   them or keeping an untouched suffix
//! - **Migration**: Element-wise re-encoding when the codec changes
//!
//! ## Example
//!
//! ```ignore
//! use keyed_list_state::{BackendConfig, KeyedState, KeyedStateBackend, MemoryStore, U64Codec};
//! use std::sync::Arc;
//!
//! let backend = KeyedStateBackend::new(Arc::new(MemoryStore::new()), BackendConfig::default())?;
//! let mut clicks = backend.register_list_state::<String, (), _>("clicks", U64Codec)?;
//!
//! clicks.set_current_key(&"user-1".to_string())?;
//! clicks.add(&42)?;
//! clicks.add_all(&[43, 44])?;
//! assert_eq!(clicks.get()?, vec![42, 43, 44]);
//! ```

pub mod backend;
pub mod codec;
pub mod compaction;
pub mod config;
pub mod error;
pub mod keys;
pub mod migration;
pub mod state;
pub mod store;
pub mod transform;
pub mod ttl;

// Re-exports
pub use backend::{KeyedStateBackend, StateMetaInfo};
pub use codec::{
    decode_list, encode_list, verify_codec, ByteCursor, BytesCodec, CodecDescriptor,
    ConformanceReport, ElementCodec, I64Codec, ListDecoder, MsgPackCodec, StringCodec, TtlCodec,
    TtlValue, U64Codec, DELIMITER,
};
pub use compaction::{CompactionJob, CompactionReport, CompactionWorker};
pub use config::{BackendConfig, StoreConfig};
pub use error::{Result, StateError, StorageError, StorageResult};
pub use keys::{CompositeKeyBuilder, KeyBuilder, KeyGroup};
pub use migration::{migrate_list, DisableTtl, ElementMigration, EnableTtl, Unchanged};
pub use state::{KeyedState, ListState, NamespaceMergeStats, StateKind, ValueState};
pub use store::{
    CompactionFilter, CompactionStats, KvStore, LogStore, MemoryStore, MergeOnRead,
    MergeOperator, MergeStore, Partition,
};
pub use transform::{ElementTransformer, FnTransformer, ListSnapshotTransformer, TransformStrategy};
pub use ttl::{ManualTimeProvider, SystemTimeProvider, TimeProvider, TtlFilter};
