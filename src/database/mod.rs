pub mod file_store;
pub mod memory;
pub mod store;

pub use self::file_store::FileStore;
pub use self::memory::MemoryStore;
pub use self::store::{KeyValueStore, SharedStore};
