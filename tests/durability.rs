//! List state over the log-backed store across restarts.

use keyed_list_state::{
    BackendConfig, FnTransformer, KeyedState, KeyedStateBackend, LogStore, StoreConfig,
    StringCodec, U64Codec,
};
use std::sync::Arc;
use tempfile::TempDir;

fn open_backend(dir: &TempDir) -> KeyedStateBackend<LogStore> {
    let store = LogStore::open(StoreConfig {
        path: dir.path().join("store"),
        sync_interval: 0,
        ..Default::default()
    })
    .unwrap();
    KeyedStateBackend::new(Arc::new(store), BackendConfig::default()).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[test]
fn test_lists_survive_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let meta = {
        let backend = open_backend(&dir);
        let mut state = backend
            .register_list_state::<String, u32, _>("messages", StringCodec)
            .unwrap();
        state.set_current_key(&"conversation-1".to_string()).unwrap();
        state.set_current_namespace(&7).unwrap();
        state.add(&"hello".to_string()).unwrap();
        state.add_all(&["a,b".to_string(), "c".to_string()]).unwrap();
        backend.meta_snapshot().unwrap()
    };

    let backend = open_backend(&dir);
    backend.restore_meta(&meta).unwrap();
    let mut state = backend
        .register_list_state::<String, u32, _>("messages", StringCodec)
        .unwrap();
    state.set_current_key(&"conversation-1".to_string()).unwrap();
    state.set_current_namespace(&7).unwrap();
    assert_eq!(
        state.get().unwrap(),
        vec!["hello".to_string(), "a,b".to_string(), "c".to_string()]
    );

    // Appends after restart land behind the replayed elements.
    state.add(&"d".to_string()).unwrap();
    assert_eq!(state.get().unwrap().len(), 4);
}

#[test]
fn test_update_and_clear_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let backend = open_backend(&dir);
        let mut state = backend.register_list_state::<u32, (), _>("s", U64Codec).unwrap();
        state.set_current_key(&1).unwrap();
        state.add_all(&[1, 2, 3]).unwrap();
        state.update(&[9]).unwrap();
        state.set_current_key(&2).unwrap();
        state.add(&5).unwrap();
        state.clear().unwrap();
    }

    let backend = open_backend(&dir);
    let mut state = backend.register_list_state::<u32, (), _>("s", U64Codec).unwrap();
    state.set_current_key(&1).unwrap();
    assert_eq!(state.get().unwrap(), vec![9]);
    state.set_current_key(&2).unwrap();
    assert!(state.get().unwrap().is_empty());
}

#[test]
fn test_namespace_merge_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let backend = open_backend(&dir);
        let mut state = backend.register_list_state::<u8, u8, _>("w", U64Codec).unwrap();
        state.set_current_key(&1).unwrap();
        state.set_current_namespace(&0).unwrap();
        state.add_all(&[1, 2]).unwrap();
        state.set_current_namespace(&1).unwrap();
        state.add(&3).unwrap();
        state.merge_namespaces(&0, &[1]).unwrap();
    }

    let backend = open_backend(&dir);
    let mut state = backend.register_list_state::<u8, u8, _>("w", U64Codec).unwrap();
    state.set_current_key(&1).unwrap();
    state.set_current_namespace(&0).unwrap();
    assert_eq!(state.get().unwrap(), vec![1, 2, 3]);
    state.set_current_namespace(&1).unwrap();
    assert_eq!(state.get_raw().unwrap(), None);
}

#[test]
fn test_compaction_shrinks_log() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    {
        let backend = open_backend(&dir);
        let mut state = backend.register_list_state::<u8, (), _>("s", U64Codec).unwrap();
        state.set_current_key(&1).unwrap();
        for x in 0..200u64 {
            state.add(&x).unwrap();
        }

        let before = backend.store().log_size().unwrap();
        let filter = state.snapshot_transformer(FnTransformer::new(|x: u64| (x >= 190).then_some(x)));
        let stats = backend.compact("s", Some(&filter)).unwrap();
        assert_eq!(stats.keys_rewritten, 1);
        assert!(backend.store().log_size().unwrap() < before);
    }

    let backend = open_backend(&dir);
    let mut state = backend.register_list_state::<u8, (), _>("s", U64Codec).unwrap();
    state.set_current_key(&1).unwrap();
    assert_eq!(state.get().unwrap(), (190..200).collect::<Vec<u64>>());
}
