//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for all store operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The underlying storage medium could not be reached, read or written.
    ///
    /// Always propagated to the caller; this layer never retries.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Stored bytes failed to deserialize (bad marker byte, truncated
    /// entry, failed decompression). Read paths treat this as a miss
    /// after logging; it is never silently swallowed.
    #[error("corrupt cache entry: {0}")]
    CorruptEntry(String),

    /// Store options were structurally invalid at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A value could not be serialized: the typed JSON helpers failed to
    /// encode it, or it is too large for the packed wire format.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

// == Result Type Alias ==
/// Convenience Result type for store operations.
pub type Result<T> = std::result::Result<T, CacheError>;
