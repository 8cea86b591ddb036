//! Backend Implementations Module
//!
//! Concrete stores satisfying the store contract: a process-local memory
//! map, a filesystem store, and a no-op null store.

mod file;
mod memory;
mod null;

// Re-export public types
pub use file::FileStore;
pub use memory::MemoryStore;
pub use null::NullStore;

use async_trait::async_trait;

use crate::error::Result;

// == Cleanup Trait ==
/// Bulk removal of expired entries, for backends that can enumerate their
/// keys. The periodic cleanup task drives this; lazy per-read eviction works
/// without it.
#[async_trait]
pub trait Cleanup: Send + Sync {
    /// Removes every expired entry, returning how many were dropped.
    async fn cleanup(&self) -> Result<usize>;
}
