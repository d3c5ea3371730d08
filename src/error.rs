use thiserror::Error;

/// Failures raised by a key-value store backend.
///
/// These never escape the caches: a failed read is a miss and a failed
/// write only costs a recomputation later.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to (de)serialize cache record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
