//! Configuration for the durable store and the state backend.

use crate::error::{Result, StateError, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Durable store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the log and lock file.
    pub path: PathBuf,

    /// fsync after this many writes (0 = every write).
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Upper bound on one encoded log entry, checked on write and replay.
    /// Entries carry a u32 length, so this cannot exceed `u32::MAX`.
    pub max_entry_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./state"),
            sync_interval: 100,
            create_if_missing: true,
            max_entry_size: 64 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.max_entry_size == 0 || self.max_entry_size > u32::MAX as usize {
            return Err(StorageError::InvalidConfig(format!(
                "max_entry_size must be in 1..={}, got {}",
                u32::MAX,
                self.max_entry_size
            )));
        }
        Ok(())
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Keyed state backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Number of key groups keys are hashed into. Must be in `1..=32768`.
    pub max_parallelism: u16,

    /// Capacity of the background compaction job queue.
    pub compaction_queue_capacity: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 128,
            compaction_queue_capacity: 64,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_parallelism == 0 || self.max_parallelism > 32768 {
            return Err(StateError::InvalidArgument(format!(
                "max_parallelism must be in 1..=32768, got {}",
                self.max_parallelism
            )));
        }
        if self.compaction_queue_capacity == 0 {
            return Err(StateError::InvalidArgument(
                "compaction_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_partial_json() {
        let config = StoreConfig::from_json(r#"{"path": "/tmp/x", "sync_interval": 0}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/x"));
        assert_eq!(config.sync_interval, 0);
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_store_config_entry_size_bounds() {
        assert!(StoreConfig::default().validate().is_ok());

        let zero = StoreConfig {
            max_entry_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(StorageError::InvalidConfig(_))));

        let at_limit = StoreConfig {
            max_entry_size: u32::MAX as usize,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        #[cfg(target_pointer_width = "64")]
        {
            let too_big = StoreConfig {
                max_entry_size: u32::MAX as usize + 1,
                ..Default::default()
            };
            assert!(matches!(too_big.validate(), Err(StorageError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_backend_config_validation() {
        assert!(BackendConfig::default().validate().is_ok());

        let err = BackendConfig::from_json(r#"{"max_parallelism": 0}"#).unwrap_err();
        assert!(matches!(err, StateError::InvalidArgument(_)));
    }
}
