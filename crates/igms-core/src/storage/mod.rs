//! Durable key-value media for the session blob.
//!
//! - `MemoryStorage`: tab-scoped, lives as long as the process
//! - `FileStorage`: one JSON file per key, survives restarts
//!
//! Reads and writes are synchronous from the caller's point of view.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use anyhow::Result;

pub trait SessionStorage: Send + Sync {
    /// Read the raw value stored under `key`, `None` if nothing was written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}
