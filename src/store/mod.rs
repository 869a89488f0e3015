//! Snapshot store contract.
//!
//! One opaque blob per key, last write wins. No transactions, no versions.
//! `get` must report a missing key as [`Error::NotFound`](crate::error::Error::NotFound)
//! so recovery can tell "never written" apart from an I/O failure.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
}
