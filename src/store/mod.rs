// src/store/mod.rs
//
// Container-scoped object storage the pipeline reads from and writes to at
// every stage boundary.

pub mod local;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the object at `path`. A missing object is an error.
    async fn get(&self, container: &str, path: &str) -> Result<Bytes>;

    /// Write `data` to `path`, replacing any existing object.
    async fn put(&self, container: &str, path: &str, data: Bytes) -> Result<()>;

    /// Every object path in `container` starting with `prefix`, sorted.
    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>>;
}
