use crate::error::StorageResult;
use std::sync::Arc;

/// Minimal persistence contract the caches rely on.
///
/// Only single-key atomicity is assumed: a `set` fully replaces the value
/// stored under its key. Values are opaque strings (the caches store JSON).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Returns true if a value was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;
