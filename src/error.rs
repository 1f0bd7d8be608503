//! Error types for the store and state layers.

use thiserror::Error;

/// Errors raised by an embedded store implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Partition already exists: {0}")]
    PartitionExists(String),

    #[error("Partition {0} has no merge operator")]
    MergeNotSupported(String),

    #[error("Store is closed")]
    Closed,

    #[error("Store not initialized: {0}")]
    NotInitialized(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Invalid store config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Main error type for state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The encoded list (or an element inside it) has a malformed byte layout.
    #[error("Corrupt list encoding: {0}")]
    CorruptEncoding(String),

    /// The underlying store call failed.
    #[error("Error while {context}: {source}")]
    StateAccess {
        context: String,
        #[source]
        source: StorageError,
    },

    /// Migrating an element (or the whole stream) to a new codec failed.
    #[error("State migration failed: {message}")]
    StateMigration {
        message: String,
        #[source]
        source: Option<Box<StateError>>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("State not registered: {0}")]
    StateNotRegistered(String),

    #[error("State kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: String, got: String },

    #[error("Incompatible schema for state {name}: registered {registered}, requested {requested}")]
    IncompatibleSchema {
        name: String,
        registered: String,
        requested: String,
    },

    #[error("No current key set on state handle")]
    KeyNotSet,
}

impl StateError {
    /// Wrap a store failure with a description of what was being attempted.
    pub fn access(context: impl Into<String>, source: StorageError) -> Self {
        StateError::StateAccess {
            context: context.into(),
            source,
        }
    }

    /// Wrap any state error as a migration failure.
    pub fn migration(message: impl Into<String>, source: StateError) -> Self {
        StateError::StateMigration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<StorageError> for StateError {
    fn from(e: StorageError) -> Self {
        StateError::access("accessing the store", e)
    }
}

impl From<rmp_serde::encode::Error> for StateError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
